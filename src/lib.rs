pub mod config;
pub mod error;
pub mod db;
pub mod node;
pub mod store;
pub mod provider;
pub mod dispatch;
pub mod engine;
pub mod http;

pub use config::Config;
pub use error::{DegreesError, Result};
pub use engine::{RelaxEngine, RelaxResult};
pub use node::{NodeKey, NodeKind, NodeRecord, NodeRef};

//! Task dispatch: at-least-once scheduling of relaxation work.

use crate::error::Result;
use crate::node::NodeKind;
use async_trait::async_trait;

pub mod http;
pub mod queue;
pub mod worker;

pub use http::HttpDispatcher;
pub use queue::{QueuedTask, TaskQueue};
pub use worker::Worker;

/// Append-only submission interface for relaxation tasks.
///
/// Delivery is at-least-once with no ordering guarantee: a submitted task
/// will eventually re-enter the relaxation engine with these arguments,
/// possibly more than once. The engine's no-op guard makes duplicates
/// harmless.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn submit(&self, kind: NodeKind, raw_id: &str, candidate: u32) -> Result<()>;
}

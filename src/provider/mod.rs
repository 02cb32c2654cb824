//! Graph provider: on-demand neighbor expansion from the upstream API.

use crate::error::Result;
use crate::node::{NodeKind, NodeRef};
use async_trait::async_trait;

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Expands a node into its (unexpanded) neighbor references.
///
/// Implementations make a slow, rate-limited remote call and must not
/// retry internally: a transient failure propagates to the invocation
/// boundary, where the dispatcher redelivers the whole relaxation. An
/// upstream not-found is an empty neighbor list, not an error.
#[async_trait]
pub trait GraphProvider: Send + Sync {
    async fn expand(&self, kind: NodeKind, raw_id: &str) -> Result<Vec<NodeRef>>;
}

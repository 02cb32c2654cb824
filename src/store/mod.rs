//! Distance store: the single source of truth shared by all relaxations.

use crate::error::Result;
use crate::node::{NodeKey, NodeRecord, NodeRef};
use async_trait::async_trait;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Outcome of an atomic compare-and-lower on a node's distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerOutcome {
    /// The record was created at the candidate distance, or its stored
    /// distance was strictly larger and has been lowered.
    Lowered,
    /// The stored distance already equals the candidate, but fan-out for
    /// it never completed — a previous delivery died between the distance
    /// write and the end of neighbor submission. The caller must expand.
    ExpansionPending,
    /// The stored distance is at least as good and fully fanned out.
    Unchanged,
}

/// Key-value view of the node store.
///
/// `compare_and_lower` must be atomic with respect to concurrent callers
/// on the same key: two racing relaxations may both observe `Lowered`,
/// but the surviving stored distance is always the minimum of all
/// candidates ever applied. Convergence of the whole traversal rests on
/// this guarantee.
#[async_trait]
pub trait DistanceStore: Send + Sync {
    /// Fetch the current record for a node, if it has been discovered.
    async fn get(&self, key: &NodeKey) -> Result<Option<NodeRecord>>;

    /// Atomically create-or-lower the node's distance to `candidate`.
    async fn compare_and_lower(&self, node: &NodeRef, candidate: u32) -> Result<LowerOutcome>;

    /// Record that fan-out completed for the node at `distance`.
    ///
    /// A no-op if the stored distance has moved below `distance` in the
    /// meantime: the lower write carries its own pending fan-out.
    async fn mark_expanded(&self, key: &NodeKey, distance: u32) -> Result<()>;

    /// Persist an edge observation. Audit data, unique per (from, to);
    /// replaying the same observation is harmless.
    async fn record_adjacency(&self, from: &NodeKey, to: &NodeKey, distance: u32) -> Result<()>;
}

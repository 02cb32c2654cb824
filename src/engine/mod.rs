//! The relaxation engine: decides whether a candidate distance improves a
//! node, and fans out follow-up tasks to its neighbors when it does.
//!
//! Every relaxation is an independent unit of work delivered by the task
//! dispatcher, possibly more than once. The engine is safe under that
//! delivery model because the store's compare-and-lower is atomic and a
//! non-improving candidate short-circuits before the expensive provider
//! call, writing nothing and submitting nothing.

use crate::dispatch::TaskDispatcher;
use crate::error::Result;
use crate::node::{NodeKind, NodeRef};
use crate::provider::GraphProvider;
use crate::store::{DistanceStore, LowerOutcome};
use std::sync::Arc;

/// Outcome of a single relaxation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxResult {
    /// The node's distance was created or lowered and its neighbors were
    /// submitted for relaxation at distance + 1.
    Improved,
    /// The candidate did not beat the stored distance. Nothing written,
    /// nothing expanded, nothing submitted.
    NotImproved,
    /// The node kind was not recognized. Caller error; never retried.
    InvalidNode,
}

impl RelaxResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelaxResult::Improved => "improved",
            RelaxResult::NotImproved => "not_improved",
            RelaxResult::InvalidNode => "invalid_node",
        }
    }
}

/// The relaxation engine. Its three collaborators are injected as trait
/// objects so tests can run it against in-memory fakes.
pub struct RelaxEngine {
    store: Arc<dyn DistanceStore>,
    provider: Arc<dyn GraphProvider>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl RelaxEngine {
    pub fn new(
        store: Arc<dyn DistanceStore>,
        provider: Arc<dyn GraphProvider>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            store,
            provider,
            dispatcher,
        }
    }

    /// Relaxation entry point for transports that carry the kind as a
    /// string. An unrecognized kind is reported as `InvalidNode` with no
    /// side effects, so the dispatcher acks instead of redelivering a
    /// call that can never succeed.
    pub async fn relax_raw(&self, kind: &str, raw_id: &str, candidate: u32) -> Result<RelaxResult> {
        match kind.parse::<NodeKind>() {
            Ok(kind) => self.relax(kind, raw_id, candidate).await,
            Err(e) => {
                log::warn!("rejecting relaxation of {}-{}: {}", kind, raw_id, e);
                Ok(RelaxResult::InvalidNode)
            }
        }
    }

    /// Propose `candidate` as the distance for a node.
    ///
    /// If the stored distance is already as good, this is a no-op. If the
    /// candidate improves it (or a previous delivery wrote the distance
    /// but died before finishing fan-out), the node's neighbors are
    /// fetched from the provider and one relaxation task is submitted per
    /// neighbor at `candidate + 1`, with an adjacency record persisted
    /// for each edge.
    ///
    /// On a provider or dispatcher failure the distance write stands and
    /// the error propagates as retryable; the redelivered call resumes
    /// fan-out instead of being swallowed by the no-op guard.
    pub async fn relax(&self, kind: NodeKind, raw_id: &str, candidate: u32) -> Result<RelaxResult> {
        let node = NodeRef::new(kind, raw_id);
        let key = node.key();

        match self.store.compare_and_lower(&node, candidate).await? {
            LowerOutcome::Unchanged => {
                log::debug!("{} not improved by candidate {}", key, candidate);
                return Ok(RelaxResult::NotImproved);
            }
            LowerOutcome::Lowered => {
                log::info!("{} distance lowered to {}", key, candidate);
            }
            LowerOutcome::ExpansionPending => {
                log::info!("{} resuming interrupted fan-out at {}", key, candidate);
            }
        }

        // The dominant cost and the rate-limit risk: only reached when the
        // distance actually improved, never for duplicate deliveries.
        let neighbors = self.provider.expand(kind, raw_id).await?;

        let next = candidate + 1;
        for neighbor in &neighbors {
            self.store
                .record_adjacency(&key, &neighbor.key(), next)
                .await?;
            self.dispatcher
                .submit(neighbor.kind, &neighbor.raw_id, next)
                .await?;
        }

        self.store.mark_expanded(&key, candidate).await?;
        log::debug!(
            "{} fanned out to {} neighbors at distance {}",
            key,
            neighbors.len(),
            next
        );

        Ok(RelaxResult::Improved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DegreesError;
    use crate::node::{NodeKey, NodeRecord};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory distance store with a mutation counter, so tests can
    /// assert that a no-op relaxation wrote nothing.
    #[derive(Default)]
    struct MemoryStore {
        nodes: Mutex<HashMap<String, NodeRecord>>,
        adjacencies: Mutex<Vec<(String, String, u32)>>,
        writes: AtomicUsize,
    }

    impl MemoryStore {
        fn distance_of(&self, key: &NodeKey) -> Option<u32> {
            self.nodes
                .lock()
                .unwrap()
                .get(key.as_str())
                .map(|r| r.distance)
        }

        fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DistanceStore for MemoryStore {
        async fn get(&self, key: &NodeKey) -> Result<Option<NodeRecord>> {
            Ok(self.nodes.lock().unwrap().get(key.as_str()).cloned())
        }

        async fn compare_and_lower(&self, node: &NodeRef, candidate: u32) -> Result<LowerOutcome> {
            let mut nodes = self.nodes.lock().unwrap();
            let key = node.key();
            match nodes.get_mut(key.as_str()) {
                None => {
                    nodes.insert(
                        key.as_str().to_string(),
                        NodeRecord {
                            kind: node.kind,
                            raw_id: node.raw_id.clone(),
                            key,
                            distance: candidate,
                            expanded: false,
                        },
                    );
                    self.writes.fetch_add(1, Ordering::SeqCst);
                    Ok(LowerOutcome::Lowered)
                }
                Some(record) if candidate < record.distance => {
                    record.distance = candidate;
                    record.expanded = false;
                    self.writes.fetch_add(1, Ordering::SeqCst);
                    Ok(LowerOutcome::Lowered)
                }
                Some(record) if candidate == record.distance && !record.expanded => {
                    Ok(LowerOutcome::ExpansionPending)
                }
                Some(_) => Ok(LowerOutcome::Unchanged),
            }
        }

        async fn mark_expanded(&self, key: &NodeKey, distance: u32) -> Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            if let Some(record) = nodes.get_mut(key.as_str()) {
                if record.distance == distance && !record.expanded {
                    record.expanded = true;
                    self.writes.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        }

        async fn record_adjacency(&self, from: &NodeKey, to: &NodeKey, distance: u32) -> Result<()> {
            let mut adjacencies = self.adjacencies.lock().unwrap();
            let edge = (from.as_str().to_string(), to.as_str().to_string(), distance);
            if !adjacencies.iter().any(|(f, t, _)| f == &edge.0 && t == &edge.1) {
                adjacencies.push(edge);
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    /// Static neighbor table keyed by node key; can be toggled to fail.
    #[derive(Default)]
    struct FakeProvider {
        neighbors: HashMap<String, Vec<NodeRef>>,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn with_edges(edges: &[(&str, NodeKind, &[&str])]) -> Self {
            let mut neighbors = HashMap::new();
            for (key, kind, ids) in edges {
                let refs = ids
                    .iter()
                    .map(|id| NodeRef::new(kind.opposite(), *id))
                    .collect();
                neighbors.insert(key.to_string(), refs);
            }
            Self {
                neighbors,
                ..Default::default()
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl GraphProvider for FakeProvider {
        async fn expand(&self, kind: NodeKind, raw_id: &str) -> Result<Vec<NodeRef>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(DegreesError::Provider("simulated outage".to_string()));
            }
            let key = NodeKey::new(kind, raw_id);
            Ok(self.neighbors.get(key.as_str()).cloned().unwrap_or_default())
        }
    }

    /// Records every submission instead of queueing anything.
    #[derive(Default)]
    struct RecordingDispatcher {
        submitted: Mutex<Vec<(NodeKind, String, u32)>>,
    }

    impl RecordingDispatcher {
        fn submissions(&self) -> Vec<(NodeKind, String, u32)> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskDispatcher for RecordingDispatcher {
        async fn submit(&self, kind: NodeKind, raw_id: &str, candidate: u32) -> Result<()> {
            self.submitted
                .lock()
                .unwrap()
                .push((kind, raw_id.to_string(), candidate));
            Ok(())
        }
    }

    fn engine_with(
        provider: FakeProvider,
    ) -> (Arc<MemoryStore>, Arc<RecordingDispatcher>, RelaxEngine) {
        let store = Arc::new(MemoryStore::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let engine = RelaxEngine::new(
            store.clone(),
            Arc::new(provider),
            dispatcher.clone(),
        );
        (store, dispatcher, engine)
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let provider =
            FakeProvider::with_edges(&[("person-1", NodeKind::Person, &["10", "11"])]);
        let (store, dispatcher, engine) = engine_with(provider);

        let first = engine.relax(NodeKind::Person, "1", 2).await.unwrap();
        assert_eq!(first, RelaxResult::Improved);

        let writes_before = store.write_count();
        let submissions_before = dispatcher.submissions().len();

        // Same (node, distance) delivered again: a guaranteed no-op
        let second = engine.relax(NodeKind::Person, "1", 2).await.unwrap();
        assert_eq!(second, RelaxResult::NotImproved);
        assert_eq!(store.write_count(), writes_before);
        assert_eq!(dispatcher.submissions().len(), submissions_before);
    }

    #[tokio::test]
    async fn test_stored_distance_never_raised() {
        let (store, _dispatcher, engine) = engine_with(FakeProvider::default());
        let key = NodeKey::new(NodeKind::Work, "7");

        let mut last = u32::MAX;
        for candidate in [9, 4, 8, 4, 2, 6] {
            engine.relax(NodeKind::Work, "7", candidate).await.unwrap();
            let stored = store.distance_of(&key).unwrap();
            assert!(stored <= last, "distance raised from {} to {}", last, stored);
            last = stored;
        }
        assert_eq!(last, 2);
    }

    #[tokio::test]
    async fn test_fan_out_submits_one_task_per_neighbor() {
        let provider = FakeProvider::with_edges(&[(
            "work-5",
            NodeKind::Work,
            &["100", "101", "102"],
        )]);
        let (store, dispatcher, engine) = engine_with(provider);

        let result = engine.relax(NodeKind::Work, "5", 3).await.unwrap();
        assert_eq!(result, RelaxResult::Improved);

        let submissions = dispatcher.submissions();
        assert_eq!(submissions.len(), 3);
        for (kind, _raw_id, distance) in &submissions {
            assert_eq!(*kind, NodeKind::Person);
            assert_eq!(*distance, 4); // newly stored distance + 1
        }

        assert_eq!(store.adjacencies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_op_guard_blocks_worse_candidates() {
        let provider = FakeProvider::with_edges(&[("person-1", NodeKind::Person, &["10"])]);
        let (store, dispatcher, engine) = engine_with(provider);
        let key = NodeKey::new(NodeKind::Person, "1");

        engine.relax(NodeKind::Person, "1", 3).await.unwrap();
        let writes_before = store.write_count();
        let submissions_before = dispatcher.submissions().len();

        let worse = engine.relax(NodeKind::Person, "1", 5).await.unwrap();
        assert_eq!(worse, RelaxResult::NotImproved);
        assert_eq!(store.distance_of(&key), Some(3));
        assert_eq!(store.write_count(), writes_before);
        assert_eq!(dispatcher.submissions().len(), submissions_before);

        let better = engine.relax(NodeKind::Person, "1", 2).await.unwrap();
        assert_eq!(better, RelaxResult::Improved);
        assert_eq!(store.distance_of(&key), Some(2));
    }

    #[tokio::test]
    async fn test_first_discovery_creates_record_and_fans_out() {
        let provider =
            FakeProvider::with_edges(&[("person-42", NodeKind::Person, &["10", "11"])]);
        let (store, dispatcher, engine) = engine_with(provider);
        let key = NodeKey::new(NodeKind::Person, "42");

        assert_eq!(store.distance_of(&key), None);

        let result = engine.relax(NodeKind::Person, "42", 7).await.unwrap();
        assert_eq!(result, RelaxResult::Improved);
        assert_eq!(store.distance_of(&key), Some(7));

        let submissions = dispatcher.submissions();
        assert_eq!(submissions.len(), 2);
        assert!(submissions.iter().all(|(_, _, d)| *d == 8));
    }

    #[tokio::test]
    async fn test_seed_scenario() {
        // Seed person 1 at distance 0, neighbors work 10 and work 11
        let provider =
            FakeProvider::with_edges(&[("person-1", NodeKind::Person, &["10", "11"])]);
        let (store, dispatcher, engine) = engine_with(provider);

        let seeded = engine.relax(NodeKind::Person, "1", 0).await.unwrap();
        assert_eq!(seeded, RelaxResult::Improved);
        assert_eq!(store.distance_of(&NodeKey::new(NodeKind::Person, "1")), Some(0));

        let submissions = dispatcher.submissions();
        assert_eq!(
            submissions,
            vec![
                (NodeKind::Work, "10".to_string(), 1),
                (NodeKind::Work, "11".to_string(), 1),
            ]
        );

        // Work 10's task is delivered; it has no record yet
        let delivered = engine.relax(NodeKind::Work, "10", 1).await.unwrap();
        assert_eq!(delivered, RelaxResult::Improved);
        assert_eq!(store.distance_of(&NodeKey::new(NodeKind::Work, "10")), Some(1));

        // Redelivering the same task afterwards is a no-op
        let redelivered = engine.relax(NodeKind::Work, "10", 1).await.unwrap();
        assert_eq!(redelivered, RelaxResult::NotImproved);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_invalid_node_with_no_side_effects() {
        let (store, dispatcher, engine) = engine_with(FakeProvider::default());

        let result = engine.relax_raw("alien", "1", 0).await.unwrap();
        assert_eq!(result, RelaxResult::InvalidNode);
        assert_eq!(store.write_count(), 0);
        assert!(dispatcher.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_relax_raw_accepts_known_kinds() {
        let (_store, _dispatcher, engine) = engine_with(FakeProvider::default());
        let result = engine.relax_raw("person", "1", 0).await.unwrap();
        assert_eq!(result, RelaxResult::Improved);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_distance_and_resumes_on_redelivery() {
        let provider =
            FakeProvider::with_edges(&[("person-1", NodeKind::Person, &["10", "11"])]);
        provider.set_failing(true);
        let store = Arc::new(MemoryStore::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let provider = Arc::new(provider);
        let engine = RelaxEngine::new(store.clone(), provider.clone(), dispatcher.clone());
        let key = NodeKey::new(NodeKind::Person, "1");

        // First delivery: distance is written, then expansion fails
        let err = engine.relax(NodeKind::Person, "1", 0).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.distance_of(&key), Some(0));
        assert!(dispatcher.submissions().is_empty());

        // Provider recovers; the dispatcher redelivers the same call and
        // the interrupted fan-out completes instead of short-circuiting
        provider.set_failing(false);
        let result = engine.relax(NodeKind::Person, "1", 0).await.unwrap();
        assert_eq!(result, RelaxResult::Improved);
        assert_eq!(dispatcher.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_no_expansion_call_for_duplicate_delivery() {
        let provider = FakeProvider::with_edges(&[("person-1", NodeKind::Person, &["10"])]);
        let store = Arc::new(MemoryStore::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let provider = Arc::new(provider);
        let engine = RelaxEngine::new(store, provider.clone(), dispatcher);

        engine.relax(NodeKind::Person, "1", 1).await.unwrap();
        engine.relax(NodeKind::Person, "1", 1).await.unwrap();
        engine.relax(NodeKind::Person, "1", 4).await.unwrap();

        // The rate-limited provider was only hit for the improving call
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_leaf_node_improves_without_submissions() {
        // A node the provider has no edges for (upstream not-found)
        let (store, dispatcher, engine) = engine_with(FakeProvider::default());

        let result = engine.relax(NodeKind::Work, "999", 2).await.unwrap();
        assert_eq!(result, RelaxResult::Improved);
        assert_eq!(
            store.distance_of(&NodeKey::new(NodeKind::Work, "999")),
            Some(2)
        );
        assert!(dispatcher.submissions().is_empty());
    }
}

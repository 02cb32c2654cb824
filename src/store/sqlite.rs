use crate::db::Db;
use crate::error::{DegreesError, Result};
use crate::node::{NodeKey, NodeKind, NodeRecord, NodeRef};
use crate::store::{DistanceStore, LowerOutcome};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// SQLite-backed distance store.
///
/// The compare-and-lower is a single conditional upsert inside one
/// transaction; SQLite serializes writers, so the stored distance is a
/// monotonic minimum no matter how relaxations interleave.
pub struct SqliteStore {
    db: Arc<Db>,
}

impl SqliteStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DistanceStore for SqliteStore {
    async fn get(&self, key: &NodeKey) -> Result<Option<NodeRecord>> {
        let key_str = key.as_str().to_string();
        self.db
            .with_connection(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT kind, raw_id, distance, expanded FROM nodes WHERE node_id = ?1",
                        [&key_str],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, u32>(2)?,
                                row.get::<_, i64>(3)? != 0,
                            ))
                        },
                    )
                    .optional()?;

                match row {
                    None => Ok(None),
                    Some((kind, raw_id, distance, expanded)) => {
                        let kind: NodeKind = kind.parse()?;
                        Ok(Some(NodeRecord {
                            key: NodeKey::new(kind, &raw_id),
                            kind,
                            raw_id,
                            distance,
                            expanded,
                        }))
                    }
                }
            })
            .await
    }

    async fn compare_and_lower(&self, node: &NodeRef, candidate: u32) -> Result<LowerOutcome> {
        let key = node.key().as_str().to_string();
        let kind = node.kind.as_str();
        let raw_id = node.raw_id.clone();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let now = Utc::now().to_rfc3339();

                // Inserts a fresh record, or lowers an existing one only when
                // the candidate is a strict improvement. A lowered record gets
                // its expansion state cleared: the new distance needs its own
                // fan-out.
                let changed = tx.execute(
                    "INSERT INTO nodes (node_id, kind, raw_id, distance, expanded, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5)
                     ON CONFLICT(node_id) DO UPDATE SET
                         distance = excluded.distance,
                         expanded = 0,
                         expanded_at = NULL,
                         updated_at = excluded.updated_at
                     WHERE excluded.distance < nodes.distance",
                    params![key, kind, raw_id, candidate, now],
                )?;

                if changed > 0 {
                    tx.commit()?;
                    return Ok(LowerOutcome::Lowered);
                }

                let (distance, expanded): (u32, bool) = tx.query_row(
                    "SELECT distance, expanded FROM nodes WHERE node_id = ?1",
                    [&key],
                    |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
                )?;
                tx.commit()?;

                if distance == candidate && !expanded {
                    Ok(LowerOutcome::ExpansionPending)
                } else {
                    Ok(LowerOutcome::Unchanged)
                }
            })
            .await
    }

    async fn mark_expanded(&self, key: &NodeKey, distance: u32) -> Result<()> {
        let key_str = key.as_str().to_string();
        self.db
            .with_connection(move |conn| {
                let now = Utc::now().to_rfc3339();
                // Guarded on the distance: if a smaller candidate landed while
                // we were fanning out, its own task is responsible for marking.
                let changed = conn.execute(
                    "UPDATE nodes SET expanded = 1, expanded_at = ?1
                     WHERE node_id = ?2 AND distance = ?3 AND expanded = 0",
                    params![now, key_str, distance],
                )?;
                if changed == 0 {
                    log::debug!(
                        "mark_expanded({}, {}) was stale, distance moved on",
                        key_str,
                        distance
                    );
                }
                Ok(())
            })
            .await
    }

    async fn record_adjacency(&self, from: &NodeKey, to: &NodeKey, distance: u32) -> Result<()> {
        let from_str = from.as_str().to_string();
        let to_str = to.as_str().to_string();
        self.db
            .with_connection(move |conn| {
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO adjacencies (from_node, to_node, snapshot_distance, observed_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(from_node, to_node) DO NOTHING",
                    params![from_str, to_str, distance, now],
                )
                .map_err(DegreesError::Database)?;
                Ok(())
            })
            .await
    }
}

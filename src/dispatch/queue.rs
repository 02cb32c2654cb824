use crate::db::Db;
use crate::dispatch::TaskDispatcher;
use crate::error::{DegreesError, Result};
use crate::node::NodeKind;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A leased relaxation task.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task_id: String,
    pub kind: NodeKind,
    pub raw_id: String,
    pub distance: u32,
    pub attempts: u32,
}

/// Durable SQLite-backed task queue.
///
/// Submission appends a row; the worker leases ready rows for a bounded
/// time and deletes them on ack. A crashed worker simply lets its leases
/// expire, after which the tasks become deliverable again — this is what
/// makes delivery at-least-once rather than at-most-once.
pub struct TaskQueue {
    db: Arc<Db>,
}

impl TaskQueue {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Append a task. Returns the generated task id.
    pub async fn enqueue(&self, kind: NodeKind, raw_id: &str, distance: u32) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        let id = task_id.clone();
        let kind_str = kind.as_str();
        let raw = raw_id.to_string();

        self.db
            .with_connection(move |conn| {
                let now_ms = Utc::now().timestamp_millis();
                let created_at = Utc::now().to_rfc3339();
                conn.execute(
                    "INSERT INTO tasks (task_id, kind, raw_id, distance, attempts, available_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
                    params![id, kind_str, raw, distance, now_ms, created_at],
                )
                .map_err(|e| DegreesError::Dispatch(format!("enqueue failed: {}", e)))?;
                Ok(())
            })
            .await?;

        log::debug!("enqueued {}-{} at distance {}", kind, raw_id, distance);
        Ok(task_id)
    }

    /// Lease up to `batch` ready tasks for `lease` time.
    ///
    /// A task is ready when its availability time has passed and it holds
    /// no unexpired lease. Rows with an unparseable kind are dropped with
    /// an error log rather than poisoning the queue.
    pub async fn lease(&self, batch: usize, lease: Duration) -> Result<Vec<QueuedTask>> {
        self.db
            .with_connection(move |conn| {
                let now_ms = Utc::now().timestamp_millis();
                let until_ms = now_ms + lease.as_millis() as i64;

                let tx = conn.transaction()?;
                let rows: Vec<(String, String, String, u32, u32)> = {
                    let mut stmt = tx.prepare(
                        "SELECT task_id, kind, raw_id, distance, attempts FROM tasks
                         WHERE available_at <= ?1
                           AND (leased_until IS NULL OR leased_until <= ?1)
                         ORDER BY available_at
                         LIMIT ?2",
                    )?;
                    let mapped = stmt.query_map(params![now_ms, batch as i64], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    })?;
                    mapped
                        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
                        .map_err(DegreesError::Database)?
                };

                let mut tasks = Vec::with_capacity(rows.len());
                for (task_id, kind, raw_id, distance, attempts) in rows {
                    match kind.parse::<NodeKind>() {
                        Ok(kind) => {
                            tx.execute(
                                "UPDATE tasks SET leased_until = ?1 WHERE task_id = ?2",
                                params![until_ms, task_id],
                            )?;
                            tasks.push(QueuedTask {
                                task_id,
                                kind,
                                raw_id,
                                distance,
                                attempts,
                            });
                        }
                        Err(_) => {
                            log::error!("dropping task {} with unknown kind {:?}", task_id, kind);
                            tx.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])?;
                        }
                    }
                }
                tx.commit()?;
                Ok(tasks)
            })
            .await
    }

    /// Acknowledge a completed task (delete it).
    pub async fn ack(&self, task_id: &str) -> Result<()> {
        let id = task_id.to_string();
        self.db
            .with_connection(move |conn| {
                conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![id])
                    .map_err(DegreesError::Database)?;
                Ok(())
            })
            .await
    }

    /// Release a failed task back to the queue with a delivery delay.
    pub async fn reschedule(&self, task_id: &str, attempts: u32, delay: Duration) -> Result<()> {
        let id = task_id.to_string();
        self.db
            .with_connection(move |conn| {
                let available_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                conn.execute(
                    "UPDATE tasks SET attempts = ?1, available_at = ?2, leased_until = NULL
                     WHERE task_id = ?3",
                    params![attempts, available_at, id],
                )
                .map_err(DegreesError::Database)?;
                Ok(())
            })
            .await
    }

    /// Number of tasks currently queued (leased or not).
    pub async fn depth(&self) -> Result<i64> {
        self.db
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
                    .map_err(DegreesError::Database)
            })
            .await
    }
}

#[async_trait]
impl TaskDispatcher for TaskQueue {
    async fn submit(&self, kind: NodeKind, raw_id: &str, candidate: u32) -> Result<()> {
        self.enqueue(kind, raw_id, candidate).await?;
        Ok(())
    }
}

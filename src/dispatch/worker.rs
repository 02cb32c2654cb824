use crate::config::DispatcherConfig;
use crate::dispatch::queue::{QueuedTask, TaskQueue};
use crate::engine::RelaxEngine;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Delivery delay before a retryable task is attempted again.
/// Linear in the attempt count, capped at one minute.
fn retry_delay(attempts: u32) -> Duration {
    Duration::from_secs((attempts as u64 * 2).min(60))
}

/// Polling worker that drains the local task queue through the engine.
///
/// Leases are time-bounded: if the process dies mid-task, the lease
/// expires and another worker picks the task up again. Combined with the
/// engine's no-op guard, processing a task twice is harmless.
pub struct Worker {
    queue: Arc<TaskQueue>,
    engine: Arc<RelaxEngine>,
    poll_interval: Duration,
    lease: Duration,
    batch_size: usize,
    max_attempts: u32,
}

impl Worker {
    pub fn new(queue: Arc<TaskQueue>, engine: Arc<RelaxEngine>, config: &DispatcherConfig) -> Self {
        Self {
            queue,
            engine,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            lease: Duration::from_secs(config.lease_secs),
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
        }
    }

    /// Poll the queue until the process is stopped.
    pub async fn run(&self) {
        log::info!(
            "worker started (batch {}, lease {:?}, poll {:?})",
            self.batch_size,
            self.lease,
            self.poll_interval
        );
        loop {
            match self.run_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    log::error!("worker iteration failed: {}", e);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Lease and process one batch. Returns the number of tasks leased.
    pub async fn run_once(&self) -> Result<usize> {
        let tasks = self.queue.lease(self.batch_size, self.lease).await?;
        for task in &tasks {
            self.process(task).await?;
        }
        Ok(tasks.len())
    }

    async fn process(&self, task: &QueuedTask) -> Result<()> {
        match self
            .engine
            .relax(task.kind, &task.raw_id, task.distance)
            .await
        {
            Ok(result) => {
                log::debug!(
                    "task {} ({}-{} d={}): {}",
                    task.task_id,
                    task.kind,
                    task.raw_id,
                    task.distance,
                    result.as_str()
                );
                self.queue.ack(&task.task_id).await
            }
            Err(e) if e.is_retryable() => {
                let attempts = task.attempts + 1;
                if attempts >= self.max_attempts {
                    log::error!(
                        "dropping task {} ({}-{}) after {} attempts: {}",
                        task.task_id,
                        task.kind,
                        task.raw_id,
                        attempts,
                        e
                    );
                    self.queue.ack(&task.task_id).await
                } else {
                    let delay = retry_delay(attempts);
                    log::warn!(
                        "task {} ({}-{}) failed (attempt {}), retrying in {:?}: {}",
                        task.task_id,
                        task.kind,
                        task.raw_id,
                        attempts,
                        delay,
                        e
                    );
                    self.queue.reschedule(&task.task_id, attempts, delay).await
                }
            }
            Err(e) => {
                log::error!("task {} failed permanently: {}", task.task_id, e);
                self.queue.ack(&task.task_id).await
            }
        }
    }
}

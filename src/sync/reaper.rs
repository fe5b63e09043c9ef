//! Timeout reaper for stuck indexing tasks
//!
//! A worker that dies without committing (process kill, panic) leaves its
//! row in `indexing` forever. The reaper sweeps those rows and marks the
//! stale ones `timeout`. It writes through the same token gate as workers,
//! so a row resubmitted between scan and write is left alone.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::tasks::{TaskDb, TaskStatus, TaskUpdate};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::{debug, warn};

pub struct Reaper {
    tasks: TaskDb,
    timeout_secs: u64,
    interval: Duration,
}

impl Reaper {
    pub fn new(tasks: TaskDb, config: &SyncConfig) -> Self {
        Self {
            tasks,
            timeout_secs: config.timeout_secs,
            interval: Duration::from_secs(config.reaper_interval_secs.max(1)),
        }
    }

    /// One sweep: mark every `indexing` row older than the timeout.
    /// Returns how many rows were reaped.
    pub async fn run_once(&self) -> Result<usize> {
        let rows = self.tasks.list_by_status(TaskStatus::Indexing).await?;
        let now = Utc::now();
        let cutoff = ChronoDuration::seconds(self.timeout_secs as i64);
        let mut reaped = 0;

        for row in rows {
            let Some(started_raw) = row.started_at.as_deref() else {
                continue;
            };
            let started = match DateTime::parse_from_rfc3339(started_raw) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    warn!("Task {} has unparseable started_at: {}", row.id, e);
                    continue;
                }
            };

            let age = now.signed_duration_since(started);
            if !expired(age, cutoff) {
                continue;
            }

            let marked = self
                .tasks
                .update_if_current(
                    &row.id,
                    &row.task_token,
                    TaskUpdate {
                        status: Some(TaskStatus::Timeout),
                        completed_at: Some(now.to_rfc3339()),
                        last_error: Some(format!(
                            "Indexing exceeded {}s (started {})",
                            self.timeout_secs, started_raw
                        )),
                        ..Default::default()
                    },
                )
                .await?;

            if marked {
                warn!(
                    "Reaped task {} for document {} after {}s",
                    row.id,
                    row.document_id,
                    age.num_seconds()
                );
                reaped += 1;
            } else {
                debug!("Task {} resubmitted during sweep, skipping", row.id);
            }
        }

        Ok(reaped)
    }

    /// Sweep forever on the configured interval. Errors are logged, not
    /// fatal; the next tick retries.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(0) => {}
                Ok(n) => debug!("Reaper sweep marked {} tasks as timed out", n),
                Err(e) => warn!("Reaper sweep failed: {}", e),
            }
        }
    }
}

/// A task is stuck only when it has been running strictly longer than the
/// timeout; a row exactly at the threshold gets one more sweep
fn expired(age: ChronoDuration, timeout: ChronoDuration) -> bool {
    age > timeout
}

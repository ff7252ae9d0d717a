//! Multi-attempt orchestration for one task.
//!
//! The controller is the task's single logical owner: it drives up to
//! `max_retries` attempts through an injected [`AttemptRunner`], resets
//! per-attempt state between tries, and guarantees the task reaches a
//! terminal state no matter how an attempt ends. Attempt failure is boolean
//! here; the richer diagnostics live in the task's logs and error messages.

use crate::pool::WorkerPool;
use crate::store::TaskStore;
use async_trait::async_trait;
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One isolated attempt: fresh fingerprint, fresh session, no in-process
/// state shared with previous attempts beyond what the session store keeps.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run_attempt(&self, task_id: &str, attempt: u32) -> anyhow::Result<bool>;
}

pub struct RetryController {
    store: Arc<TaskStore>,
    pool: Arc<WorkerPool>,
    runner: Arc<dyn AttemptRunner>,
    max_retries: u32,
    backoff_ms: Range<u64>,
}

impl RetryController {
    pub fn new(
        store: Arc<TaskStore>,
        pool: Arc<WorkerPool>,
        runner: Arc<dyn AttemptRunner>,
        max_retries: u32,
        backoff_ms: Range<u64>,
    ) -> Self {
        Self {
            store,
            pool,
            runner,
            max_retries: max_retries.max(1),
            backoff_ms,
        }
    }

    /// Drive `task_id` to a terminal state.
    pub async fn run(&self, task_id: &str) {
        self.store.start(task_id);
        self.store.append_log(task_id, "Task started");

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                self.store.reset_for_retry(task_id);
                self.store.append_log(
                    task_id,
                    format!("Retrying: attempt {attempt} of {}", self.max_retries),
                );
                let backoff = self.backoff();
                self.store.append_debug_log(
                    task_id,
                    format!("backoff {}ms before attempt {attempt}", backoff.as_millis()),
                );
                tokio::time::sleep(backoff).await;
            }

            // The pool permit covers exactly the live-browser portion; the
            // backoff above happens without holding a slot.
            let success = self
                .pool
                .run(async {
                    match self.runner.run_attempt(task_id, attempt).await {
                        Ok(success) => success,
                        Err(e) => {
                            error!(task_id = %task_id, attempt, error = %e, "Attempt crashed");
                            self.store
                                .push_error(task_id, format!("attempt {attempt} crashed: {e:#}"));
                            self.store
                                .append_log(task_id, format!("Attempt {attempt} ended with an unexpected error"));
                            false
                        }
                    }
                })
                .await;

            if success {
                self.store.append_log(
                    task_id,
                    format!("Account created and verified on attempt {attempt}"),
                );
                self.store.complete(task_id);
                info!(task_id = %task_id, attempt, "Task completed");
                return;
            }
            self.store
                .append_log(task_id, format!("Attempt {attempt} failed"));
        }

        self.store.append_log(
            task_id,
            format!("All {} attempts exhausted", self.max_retries),
        );
        self.store.fail(task_id);
        warn!(task_id = %task_id, "Task failed after all attempts");
    }

    fn backoff(&self) -> Duration {
        let range = self.backoff_ms.clone();
        let millis = if range.is_empty() {
            range.start
        } else {
            rand::thread_rng().gen_range(range)
        };
        Duration::from_millis(millis)
    }
}

//! Bounded concurrency for live browser sessions.
//!
//! The pool caps how many attempts are inside a browser at once, not how
//! many tasks exist. Permit accounting is the one piece of truly global
//! shared state in the engine: a tokio semaphore plus an atomic active
//! counter for observability.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::debug;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            active: Arc::new(AtomicUsize::new(0)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Currently executing permit holders.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Wait for a free slot, then run `future` with the permit held for its
    /// whole duration. Every accepted call eventually runs as long as the
    /// running ones terminate; ordering among waiters is not guaranteed.
    pub async fn run<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is owned by the pool and never closed.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("worker pool semaphore closed");
        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(active = self.active_count(), "Worker slot acquired");

        let _guard = ActiveGuard {
            active: self.active.clone(),
        };
        future.await
    }
}

/// Decrements the active counter on every exit path, including panics.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pool_caps_concurrency_and_drains() {
        let pool = Arc::new(WorkerPool::new(2));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let pool = pool.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(async {
                    peak.fetch_max(pool.active_count(), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    peak.fetch_max(pool.active_count(), Ordering::SeqCst);
                })
                .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn counter_recovers_when_a_job_panics() {
        let pool = Arc::new(WorkerPool::new(1));
        let run = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(async { panic!("boom") }).await;
            })
        };
        assert!(run.await.is_err());
        assert_eq!(pool.active_count(), 0);

        // The permit is free again.
        pool.run(async {}).await;
    }
}

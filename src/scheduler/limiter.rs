//! Bounded fan-out for analyzer calls.
//!
//! Each call waits for a semaphore permit before it starts, so at most
//! `limit` run at once and a freed slot is handed to the next waiting call
//! immediately (no wave barriers).

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Caps how many tasks of one fan-out run concurrently.
#[derive(Debug, Default)]
pub struct ConcurrencyLimiter {
    in_flight: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every task with at most `limit` outstanding, returning all outputs
    /// in input order once the last one completes.
    ///
    /// Each task's outcome is its own output; a failing task does not stop
    /// its siblings.
    pub async fn run_all<I, Fut>(&self, tasks: I, limit: usize) -> Vec<Fut::Output>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future,
    {
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));
        let guarded = tasks.into_iter().map(|task| {
            let semaphore = Arc::clone(&semaphore);
            let in_flight = Arc::clone(&self.in_flight);
            async move {
                let _permit = semaphore.acquire().await.ok();
                let _slot = SlotGuard::new(in_flight);
                task.await
            }
        });
        join_all(guarded).await
    }

    /// Tasks currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Counts a running task; released on drop.
struct SlotGuard {
    counter: Arc<AtomicUsize>,
}

impl SlotGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

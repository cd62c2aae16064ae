//! Pending work queue with backpressure.

use parking_lot::Mutex;

use super::priority::{Priority, PriorityQueue};
use super::work_item::WorkItem;
use crate::engine::EngineError;

/// Configuration for the work queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Submissions are rejected once this many items are pending.
    pub max_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_depth: 1024 }
    }
}

/// Thread-safe priority queue of work items.
///
/// The lock is held only for push/drain, never across an await.
pub struct WorkQueue {
    queue: Mutex<PriorityQueue<WorkItem>>,
    config: QueueConfig,
}

impl WorkQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            queue: Mutex::new(PriorityQueue::new()),
            config,
        }
    }

    /// Enqueue an item. Returns the queue depth after insertion.
    ///
    /// On rejection the item is dropped, which closes its result channel.
    pub fn enqueue(&self, item: WorkItem) -> Result<usize, EngineError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.config.max_depth {
            return Err(EngineError::QueueFull {
                current: queue.len(),
                max: self.config.max_depth,
            });
        }
        let priority = item.priority;
        queue.push(item, priority);
        Ok(queue.len())
    }

    /// Remove up to `max_count` items, highest priority first, FIFO within a tier.
    pub fn drain(&self, max_count: usize) -> Vec<WorkItem> {
        self.queue.lock().drain(max_count)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn count_at(&self, priority: Priority) -> usize {
        self.queue.lock().count_at(priority)
    }
}

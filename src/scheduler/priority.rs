//! Request prioritization.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Priority level for analysis requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    RealTime,
}

impl Priority {
    pub fn is_real_time(self) -> bool {
        self == Self::RealTime
    }

    /// Stable label for metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::RealTime => "real_time",
        }
    }

    fn lane(self) -> usize {
        match self {
            Self::RealTime => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One FIFO lane per tier; drained highest tier first.
///
/// Arrival order within a tier is the push order, so no timestamps are
/// compared.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    lanes: [VecDeque<T>; 4],
    len: usize,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            lanes: Default::default(),
            len: 0,
        }
    }

    pub fn push(&mut self, item: T, priority: Priority) {
        self.lanes[priority.lane()].push_back(item);
        self.len += 1;
    }

    /// Remove and return up to `max_count` items in priority order.
    pub fn drain(&mut self, max_count: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(max_count.min(self.len));
        for lane in &mut self.lanes {
            let take = (max_count - out.len()).min(lane.len());
            out.extend(lane.drain(..take));
            if out.len() == max_count {
                break;
            }
        }
        self.len -= out.len();
        out
    }

    /// Number of queued items at `priority`.
    pub fn count_at(&self, priority: Priority) -> usize {
        self.lanes[priority.lane()].len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Request scheduling.
//!
//! Priority queuing, batch formation, bounded fan-out to the analyzer and
//! the two sizing feedback loops (latency-driven and load-driven).

mod adaptive;
mod batch;
mod limiter;
mod load;
mod priority;
mod queue;
mod sizing;
mod timer;
mod work_item;

pub use adaptive::{
    decide, Adaptation, AdaptiveConfig, AdaptiveController, LatencyStats, LatencyWindow,
    SizingDecision,
};
pub use batch::{BatchScheduler, ItemExecutor, SchedulerParts, SchedulerPhase};
pub use limiter::ConcurrencyLimiter;
pub use load::{
    evaluate, FixedLoadProbe, HostLoadProbe, LoadAction, LoadAdjuster, LoadAdjusterConfig,
    LoadProbe,
};
pub use priority::{Priority, PriorityQueue};
pub use queue::{QueueConfig, WorkQueue};
pub use sizing::{SizingConfig, SizingState};
pub use timer::BatchTimer;
pub use work_item::{ResultRx, ResultTx, WorkItem, WorkResult};

//! Queued unit of analysis work.

use std::time::Instant;

use tokio::sync::oneshot;

use super::priority::Priority;
use crate::engine::{AnalysisContext, AnalysisResult, EngineError, Payload};
use crate::memory::CacheKey;
use crate::shutdown::ShutdownGuard;

/// Outcome delivered to the submitter.
pub type WorkResult = Result<AnalysisResult, EngineError>;
/// Sender half held by the work item.
pub type ResultTx = oneshot::Sender<WorkResult>;
/// Receiver half awaited by the submitter.
pub type ResultRx = oneshot::Receiver<WorkResult>;

/// A pending analysis request.
///
/// Owns the only sender for its result. `settle` consumes the item, so the
/// result is delivered at most once, and moving the item between queue and
/// batch never duplicates it.
///
/// An attached [`ShutdownGuard`] keeps the request counted as in flight until
/// the item is settled or dropped, even if the submitter stops waiting.
pub struct WorkItem {
    pub id: u64,
    pub payload: Payload,
    pub context: AnalysisContext,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub cache_key: CacheKey,
    responder: ResultTx,
    admission: Option<ShutdownGuard>,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("cache_key", &self.cache_key.short())
            .finish()
    }
}

impl WorkItem {
    /// Create an item and the receiver its submitter awaits.
    pub fn new(
        id: u64,
        payload: Payload,
        context: AnalysisContext,
        priority: Priority,
        cache_key: CacheKey,
    ) -> (Self, ResultRx) {
        let (tx, rx) = oneshot::channel();
        let item = Self {
            id,
            payload,
            context,
            priority,
            enqueued_at: Instant::now(),
            cache_key,
            responder: tx,
            admission: None,
        };
        (item, rx)
    }

    /// Hold `guard` for the lifetime of the item.
    pub fn with_admission(mut self, guard: ShutdownGuard) -> Self {
        self.admission = Some(guard);
        self
    }

    pub fn is_real_time(&self) -> bool {
        self.priority.is_real_time()
    }

    /// Deliver the result, then release the admission. Returns false if the
    /// submitter stopped waiting.
    pub fn settle(self, result: WorkResult) -> bool {
        let Self {
            responder,
            admission,
            ..
        } = self;
        let delivered = responder.send(result).is_ok();
        drop(admission);
        delivered
    }
}

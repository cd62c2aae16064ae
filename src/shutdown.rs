//! Graceful shutdown coordination.
//!
//! Once shutdown starts, new submissions are refused while requests already
//! admitted run to completion, bounded by a timeout.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Stopped => 2,
        }
    }
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Tracks admitted requests and the shutdown state.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running.as_u8()),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Track an admitted request. Returns None if shutting down.
    pub fn track(&self) -> Option<ShutdownGuard> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = ShutdownGuard {
            counter: Arc::clone(&self.in_flight),
            notify: Arc::clone(&self.notify),
        };
        // Checked after the increment so a concurrent `initiate` either sees
        // this request or this request sees the new state.
        if !self.is_accepting() {
            return None;
        }
        Some(guard)
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting and wait for admitted requests to settle.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        let _ = self.state.compare_exchange(
            ShutdownState::Running.as_u8(),
            ShutdownState::Draining.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        let result = self.wait_for_drain(timeout).await;

        self.state
            .store(ShutdownState::Stopped.as_u8(), Ordering::SeqCst);
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let drained = async {
            loop {
                // Registered before the check so a release in between is seen.
                let released = self.notify.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                released.await;
            }
        };

        match tokio::time::timeout(timeout, drained).await {
            Ok(()) => ShutdownResult::Complete,
            Err(_) => match self.in_flight_count() {
                0 => ShutdownResult::Complete,
                remaining => ShutdownResult::Timeout { remaining },
            },
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight request tracking.
#[derive(Debug)]
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

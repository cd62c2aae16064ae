//! Cancellable one-shot timer for batch formation.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Single-slot timer. Arming a new deadline cancels any pending one.
#[derive(Debug, Default)]
pub struct BatchTimer {
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl BatchTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay`, replacing any pending timer.
    pub fn arm<F>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(pending) = slot.take() {
            pending.abort();
        }
        *slot = Some(spawn_timer(delay, on_fire));
    }

    /// Arm only if no timer is pending. Returns true if armed.
    pub fn arm_if_idle<F>(&self, delay: Duration, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *slot = Some(spawn_timer(delay, on_fire));
        true
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(pending) = self.slot.lock().take() {
            pending.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for BatchTimer {
    fn drop(&mut self) {
        if let Some(pending) = self.slot.get_mut().take() {
            pending.abort();
        }
    }
}

fn spawn_timer<F>(delay: Duration, on_fire: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        on_fire();
    })
}

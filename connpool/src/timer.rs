//! One-shot timer on the local reactor.
//!
//! A timer is armed while its task is alive. Re-arming aborts the previous
//! task first, so at most one expiry is pending per timer.

use tokio::task::JoinHandle;
use tokio::time::Instant;

pub(crate) struct Timer {
    name: &'static str,
    deadline: Option<Instant>,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            deadline: None,
            handle: None,
        }
    }

    /// Arm the timer for `deadline`, replacing any pending expiry.
    ///
    /// # Panics
    ///
    /// Panics if called outside a `tokio::task::LocalSet`.
    pub fn arm<F>(&mut self, deadline: Instant, on_expire: F)
    where
        F: FnOnce() + 'static,
    {
        self.cancel();
        tracing::trace!(timer = self.name, ?deadline, "Arming timer");
        self.deadline = Some(deadline);
        self.handle = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep_until(deadline).await;
            on_expire();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.deadline = None;
    }

    /// Mark the pending expiry as delivered. Called from the expiry callback
    /// itself, so the running task is released rather than aborted.
    pub fn expired(&mut self) {
        self.handle = None;
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

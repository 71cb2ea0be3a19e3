//! Reconnection controller.
//!
//! The fill step starts one connect attempt into the first absent slot. At
//! most one attempt is in flight per pool. A failed attempt frees its slot
//! and, while the pool-lifetime retry budget lasts, schedules another fill
//! step one reconnection interval later. Once the budget is spent, failures
//! are only logged; the next waiter registration triggers a fresh attempt.
//!
//! Retries are spaced by the reconnection interval: a failed completion
//! never starts the next attempt directly, it only arms the timer.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::connector::Connector;
use crate::io::Transport;
use crate::pool::{FAR_FUTURE, PoolState, Shared};
use crate::slot::{Slot, SlotId, SlotState};
use crate::waitqueue::Waiter;

enum Completion {
    Abandoned,
    Idle,
    Handoff(Waiter),
    Failed,
}

impl<C: Connector> Shared<C> {
    /// Start one connect attempt into the first absent slot, if any.
    pub(crate) fn fill(self: &Rc<Self>) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        if state.shut_down {
            return;
        }
        if let Some(attempt) = state.in_flight {
            trace!(attempt, "Connect attempt already in flight");
            return;
        }
        let Some(id) = state.slots.first_absent() else {
            trace!("No absent slot to fill");
            return;
        };

        let socket = match self.connector.allocate(state.addr) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(slot = %id, error = %e, "Failed to allocate transport, deferring fill");
                // Retry the whole step later without spending budget, but
                // only while someone is waiting for the result.
                if !state.waiters.is_empty() {
                    self.arm_reconnect_timer(state);
                }
                return;
            }
        };

        state.attempts += 1;
        let attempt = state.attempts;
        state.in_flight = Some(attempt);
        state.slots.insert(id, Slot::connecting(attempt));
        debug!(slot = %id, attempt, addr = %state.addr, "Starting connect attempt");

        let connector = Rc::clone(&self.connector);
        let addr = state.addr;
        let limit = state.config.connect_timeout();
        let weak = Rc::downgrade(self);

        tokio::task::spawn_local(async move {
            let result = connect(&*connector, socket, addr, limit).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_connect_complete(id, attempt, result);
            }
        });
    }

    fn on_connect_complete(
        self: &Rc<Self>,
        id: SlotId,
        attempt: u64,
        result: io::Result<C::Stream>,
    ) {
        // Dropped only after the pool borrow ends; it may carry a caller context.
        let mut released = None;
        let completion = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;

            if state.in_flight == Some(attempt) {
                state.in_flight = None;
            }

            match state.slots.get_mut(id) {
                Ok(slot) if slot.attempt == attempt && slot.state == SlotState::Connecting => {
                    match result {
                        Ok(stream) => {
                            slot.transport = Some(Transport::new(stream));
                            match state.waiters.pop_head() {
                                Some(waiter) => {
                                    slot.state = SlotState::InUse;
                                    self.rearm_wait_timer(state);
                                    Completion::Handoff(waiter)
                                }
                                None => {
                                    slot.state = SlotState::Connected;
                                    Completion::Idle
                                }
                            }
                        }
                        Err(e) => {
                            released = state.slots.remove(id);
                            if state.reconnect_budget > 0 {
                                state.reconnect_budget -= 1;
                                warn!(
                                    slot = %id,
                                    attempt,
                                    error = %e,
                                    budget = state.reconnect_budget,
                                    "Connect failed, scheduling reconnect"
                                );
                                self.arm_reconnect_timer(state);
                            } else {
                                warn!(
                                    slot = %id,
                                    attempt,
                                    error = %e,
                                    "Connect failed, reconnection budget exhausted"
                                );
                            }
                            Completion::Failed
                        }
                    }
                }
                // Closed while connecting, or the pool was shut down.
                _ => Completion::Abandoned,
            }
        };

        match completion {
            Completion::Handoff(waiter) => {
                info!(slot = %id, attempt, "Connected, resuming waiter");
                waiter.resume(Ok(id));
            }
            Completion::Idle => info!(slot = %id, attempt, "Connected, slot idle"),
            Completion::Abandoned => debug!(slot = %id, attempt, "Connect attempt abandoned"),
            Completion::Failed => {
                drop(released);
                return;
            }
        }

        // Keep using spare capacity for anyone still queued.
        let pending = !self.state.borrow().waiters.is_empty();
        if pending {
            self.fill();
        }
    }

    fn arm_reconnect_timer(self: &Rc<Self>, state: &mut PoolState<C::Stream>) {
        let now = Instant::now();
        let deadline = now
            .checked_add(state.config.reconnect_interval())
            .unwrap_or_else(|| now + FAR_FUTURE);
        let weak = Rc::downgrade(self);
        state.reconnect_timer.arm(deadline, move || {
            if let Some(shared) = weak.upgrade() {
                shared.state.borrow_mut().reconnect_timer.expired();
                shared.fill();
            }
        });
    }
}

async fn connect<C: Connector>(
    connector: &C,
    socket: C::Socket,
    addr: SocketAddr,
    limit: Option<std::time::Duration>,
) -> io::Result<C::Stream> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, connector.connect(socket, addr))
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect attempt timed out",
                ))
            }),
        None => connector.connect(socket, addr).await,
    }
}

//! Pool manager.
//!
//! Composes the slot table, the wait queue with its deadline timer, and the
//! reconnection controller behind a cloneable handle. All state lives on the
//! local reactor thread; callbacks are always invoked with no pool borrow
//! held, so they may call back into the pool.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::connector::{Connector, TcpConnector};
use crate::error::{PoolError, Result};
use crate::slot::{SlotId, SlotState, SlotTable};
use crate::timer::Timer;
use crate::waitqueue::WaitQueue;

/// Deadline used when `now + timeout` does not fit in an `Instant`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub(crate) struct PoolState<S> {
    pub config: PoolConfig,
    pub addr: SocketAddr,
    pub slots: SlotTable<S>,
    pub waiters: WaitQueue,
    pub wait_timer: Timer,
    pub reconnect_timer: Timer,
    pub reconnect_budget: u32,
    /// Attempt number of the connect currently in flight.
    pub in_flight: Option<u64>,
    pub attempts: u64,
    pub shut_down: bool,
}

pub(crate) struct Shared<C: Connector> {
    pub connector: Rc<C>,
    pub state: RefCell<PoolState<C::Stream>>,
}

impl<C: Connector> Drop for Shared<C> {
    // Last handle gone without `shutdown()`: queued waiters still get their one callback.
    fn drop(&mut self) {
        let waiters = self.state.get_mut().waiters.drain();
        for waiter in waiters {
            waiter.resume(Err(PoolError::ShutDown));
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub connecting: usize,
    /// Connected and idle.
    pub connected: usize,
    pub in_use: usize,
    pub waiting: usize,
    pub reconnect_budget: u32,
    /// Connect attempts started over the pool's lifetime.
    pub connect_attempts: u64,
}

/// Fixed-capacity pool of connections to a single endpoint.
///
/// The handle is cheap to clone and is `!Send`: create and drive it from a
/// `tokio::task::LocalSet`. Nothing connects until the first waiter
/// registers.
///
/// # Panics
///
/// Operations that start background work (`wait_socket`, the I/O calls)
/// panic if called outside a `LocalSet`.
pub struct ConnectionPool<C: Connector = TcpConnector> {
    pub(crate) shared: Rc<Shared<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl ConnectionPool<TcpConnector> {
    pub fn new(config: PoolConfig) -> Result<Self> {
        let connector = TcpConnector::new(config.nodelay);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn with_connector(config: PoolConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;
        let config = config.normalized();
        let slots = SlotTable::with_capacity(config.capacity)?;

        info!(
            %addr,
            capacity = config.capacity,
            reconnect_interval_ms = config.reconnect_interval_ms,
            max_reconnect_attempts = config.max_reconnect_attempts,
            "Created connection pool"
        );

        let state = PoolState {
            reconnect_budget: config.max_reconnect_attempts,
            config,
            addr,
            slots,
            waiters: WaitQueue::new(),
            wait_timer: Timer::new("wait"),
            reconnect_timer: Timer::new("reconnect"),
            in_flight: None,
            attempts: 0,
            shut_down: false,
        };

        Ok(Self {
            shared: Rc::new(Shared {
                connector: Rc::new(connector),
                state: RefCell::new(state),
            }),
        })
    }

    /// Effective configuration, with defaults applied.
    pub fn config(&self) -> PoolConfig {
        self.shared.state.borrow().config.clone()
    }

    /// Borrow the first idle connection, marking it in use.
    pub fn get_socket(&self) -> Option<SlotId> {
        let mut state = self.shared.state.borrow_mut();
        let id = state.slots.first_in_state(SlotState::Connected)?;
        if let Ok(slot) = state.slots.get_mut(id) {
            slot.state = SlotState::InUse;
        }
        debug!(slot = %id, "Slot checked out");
        Some(id)
    }

    /// Return a borrowed connection, marking it idle.
    ///
    /// With `handoff_on_put` enabled and a waiter queued, the slot instead
    /// goes straight to the earliest-deadline waiter and stays in use.
    pub fn put_socket(&self, id: SlotId) -> Result<()> {
        let handoff = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let handoff_on_put = state.config.handoff_on_put;
            let slot = state.slots.get_mut(id)?;

            match slot.state {
                SlotState::InUse => {}
                SlotState::Connected => return Ok(()),
                SlotState::Connecting => {
                    warn!(slot = %id, "Ignoring put of a slot that is still connecting");
                    return Ok(());
                }
            }

            match handoff_on_put.then(|| state.waiters.pop_head()).flatten() {
                Some(waiter) => {
                    self.shared.rearm_wait_timer(state);
                    Some(waiter)
                }
                None => {
                    slot.state = SlotState::Connected;
                    None
                }
            }
        };

        match handoff {
            Some(waiter) => {
                debug!(slot = %id, "Returned slot handed to waiter");
                waiter.resume(Ok(id));
            }
            None => debug!(slot = %id, "Slot returned to pool"),
        }
        Ok(())
    }

    /// Register to be handed a slot within `timeout`.
    ///
    /// `callback` runs exactly once: with the slot id when a connection is
    /// handed over (the slot is then in use), or with `PoolError::Timeout`.
    /// Registration also runs the fill step so idle capacity gets used.
    pub fn wait_socket<F>(&self, timeout: Duration, callback: F) -> Result<()>
    where
        F: FnOnce(Result<SlotId>) + 'static,
    {
        {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            if state.shut_down {
                return Err(PoolError::ShutDown);
            }

            let now = Instant::now();
            let deadline = now
                .checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE);

            let is_head = state.waiters.push(deadline, Box::new(callback))?;
            debug!(?timeout, waiting = state.waiters.len(), "Registered waiter");

            if is_head {
                self.shared.rearm_wait_timer(state);
            }
        }

        self.shared.fill();
        Ok(())
    }

    /// `wait_socket` as a future.
    pub async fn wait_for(&self, timeout: Duration) -> Result<SlotId> {
        let (tx, rx) = oneshot::channel();
        self.wait_socket(timeout, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.await.unwrap_or(Err(PoolError::ShutDown))
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.borrow();
        PoolStats {
            capacity: state.slots.capacity(),
            connecting: state.slots.count(SlotState::Connecting),
            connected: state.slots.count(SlotState::Connected),
            in_use: state.slots.count(SlotState::InUse),
            waiting: state.waiters.len(),
            reconnect_budget: state.reconnect_budget,
            connect_attempts: state.attempts,
        }
    }

    /// Tear the pool down.
    ///
    /// Disarms both timers, resumes every waiter with `PoolError::ShutDown`
    /// and closes every slot. Pending I/O completes with `ConnectionAborted`.
    /// Later registrations fail with `PoolError::ShutDown`.
    pub fn shutdown(&self) {
        let (waiters, slots) = {
            let mut state = self.shared.state.borrow_mut();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.wait_timer.cancel();
            state.reconnect_timer.cancel();
            state.in_flight = None;
            (state.waiters.drain(), state.slots.drain())
        };

        info!(
            waiters = waiters.len(),
            slots = slots.len(),
            "Shutting down connection pool"
        );
        drop(slots);

        for waiter in waiters {
            waiter.resume(Err(PoolError::ShutDown));
        }
    }

    #[cfg(test)]
    pub(crate) fn wait_deadline(&self) -> Option<Instant> {
        self.shared.state.borrow().wait_timer.deadline()
    }

    #[cfg(test)]
    pub(crate) fn reconnect_deadline(&self) -> Option<Instant> {
        self.shared.state.borrow().reconnect_timer.deadline()
    }
}

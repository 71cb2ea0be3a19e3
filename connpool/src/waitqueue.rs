//! Deadline-ordered wait queue.
//!
//! Waiters are served by ascending absolute deadline, not arrival order; a
//! short-timeout caller that registers late is served before a long-timeout
//! caller that registered early. Equal deadlines fall back to registration
//! order. The pool's wait timer is always armed for the head's deadline, or
//! disarmed when the queue is empty.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use tokio::time::Instant;
use tracing::debug;

use crate::connector::Connector;
use crate::error::{PoolError, Result};
use crate::pool::{PoolState, Shared};
use crate::slot::SlotId;

pub(crate) type WaitCallback = Box<dyn FnOnce(Result<SlotId>)>;

pub(crate) struct Waiter {
    deadline: Instant,
    seq: u64,
    callback: WaitCallback,
}

impl Waiter {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Consumes the waiter, so the callback runs at most once.
    pub fn resume(self, outcome: Result<SlotId>) {
        (self.callback)(outcome)
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Reversed: BinaryHeap is a max-heap and the earliest deadline must be on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
pub(crate) struct WaitQueue {
    heap: BinaryHeap<Waiter>,
    next_seq: u64,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a waiter. Returns `true` if it became the head.
    pub fn push(&mut self, deadline: Instant, callback: WaitCallback) -> Result<bool> {
        self.heap.try_reserve(1).map_err(|_| PoolError::NoMemory)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Waiter {
            deadline,
            seq,
            callback,
        });

        Ok(self.heap.peek().is_some_and(|head| head.seq == seq))
    }

    pub fn pop_head(&mut self) -> Option<Waiter> {
        self.heap.pop()
    }

    pub fn head_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(Waiter::deadline)
    }

    /// Remove every waiter whose deadline is at or before `now`, earliest first.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<Waiter> {
        let mut expired = Vec::new();
        while self.head_deadline().is_some_and(|deadline| deadline <= now) {
            if let Some(waiter) = self.heap.pop() {
                expired.push(waiter);
            }
        }
        expired
    }

    pub fn drain(&mut self) -> Vec<Waiter> {
        let mut all = Vec::with_capacity(self.heap.len());
        while let Some(waiter) = self.heap.pop() {
            all.push(waiter);
        }
        all
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<C: Connector> Shared<C> {
    /// Point the wait timer at the current head, or disarm it if the queue is empty.
    pub(crate) fn rearm_wait_timer(self: &Rc<Self>, state: &mut PoolState<C::Stream>) {
        match state.waiters.head_deadline() {
            Some(deadline) if state.wait_timer.deadline() == Some(deadline) => {}
            Some(deadline) => {
                let weak = Rc::downgrade(self);
                state.wait_timer.arm(deadline, move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.expire_waiters();
                    }
                });
            }
            None => state.wait_timer.cancel(),
        }
    }

    fn expire_waiters(self: &Rc<Self>) {
        let expired = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            state.wait_timer.expired();
            let expired = state.waiters.drain_expired(Instant::now());
            self.rearm_wait_timer(state);
            expired
        };

        for waiter in expired {
            debug!(deadline = ?waiter.deadline(), "Waiter timed out");
            waiter.resume(Err(PoolError::Timeout));
        }
    }
}

//! Slot table - arena of connection slots indexed by position.
//!
//! Slot state machine:
//! - absent → `Connecting` when the fill step starts an attempt
//! - `Connecting` → `Connected` on connect success, or absent on failure
//! - `Connected` ↔ `InUse` via `get_socket` / `put_socket`
//! - any state → absent via `close_socket`

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::error::{PoolError, Result};
use crate::io::Transport;

/// Index of a slot in the pool's table. Stable while the slot is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl SlotId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Connecting,
    /// Connected and idle, eligible for `get_socket`.
    Connected,
    InUse,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::InUse => "in_use",
        }
    }
}

/// Opaque caller-owned value attached to a slot.
pub type SlotContext = Rc<dyn Any>;

/// Snapshot of a slot's metadata.
#[derive(Clone)]
pub struct SlotInfo {
    pub id: SlotId,
    pub state: SlotState,
    pub ctx: Option<SlotContext>,
}

impl fmt::Debug for SlotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotInfo")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("has_ctx", &self.ctx.is_some())
            .finish()
    }
}

pub(crate) struct Slot<S> {
    pub state: SlotState,
    /// `None` until the connect attempt completes.
    pub transport: Option<Transport<S>>,
    pub ctx: Option<SlotContext>,
    /// Connect attempt that populated this slot.
    pub attempt: u64,
}

impl<S> Slot<S> {
    pub fn connecting(attempt: u64) -> Self {
        Self {
            state: SlotState::Connecting,
            transport: None,
            ctx: None,
            attempt,
        }
    }
}

pub(crate) struct SlotTable<S> {
    slots: Vec<Option<Slot<S>>>,
}

impl<S> SlotTable<S> {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| PoolError::NoMemory)?;
        slots.resize_with(capacity, || None);
        Ok(Self { slots })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn first_absent(&self) -> Option<SlotId> {
        self.slots.iter().position(Option::is_none).map(SlotId)
    }

    pub fn first_in_state(&self, state: SlotState) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.state == state))
            .map(SlotId)
    }

    pub fn count(&self, state: SlotState) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.state == state)
            .count()
    }

    pub fn get(&self, id: SlotId) -> Result<&Slot<S>> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(PoolError::SocketNotExist(id))
    }

    pub fn get_mut(&mut self, id: SlotId) -> Result<&mut Slot<S>> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(PoolError::SocketNotExist(id))
    }

    pub fn insert(&mut self, id: SlotId, slot: Slot<S>) {
        debug_assert!(self.slots[id.0].is_none(), "slot {id} already present");
        self.slots[id.0] = Some(slot);
    }

    pub fn remove(&mut self, id: SlotId) -> Option<Slot<S>> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    pub fn info(&self, id: SlotId) -> Option<SlotInfo> {
        let slot = self.get(id).ok()?;
        Some(SlotInfo {
            id,
            state: slot.state,
            ctx: slot.ctx.clone(),
        })
    }

    /// Remove every present slot.
    pub fn drain(&mut self) -> Vec<(SlotId, Slot<S>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.take().map(|s| (SlotId(i), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = SlotTable<tokio::io::DuplexStream>;

    #[test]
    fn new_table_is_all_absent() {
        let table = Table::with_capacity(3).unwrap();
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.first_absent(), Some(SlotId::new(0)));
        assert_eq!(table.first_in_state(SlotState::Connected), None);
        assert!(matches!(
            table.get(SlotId::new(1)),
            Err(PoolError::SocketNotExist(_))
        ));
    }

    #[test]
    fn out_of_range_id_does_not_exist() {
        let table = Table::with_capacity(1).unwrap();
        assert_eq!(
            table.get(SlotId::new(7)).err(),
            Some(PoolError::SocketNotExist(SlotId::new(7)))
        );
    }

    #[test]
    fn first_absent_skips_present_slots() {
        let mut table = Table::with_capacity(3).unwrap();
        table.insert(SlotId::new(0), Slot::connecting(1));
        table.insert(SlotId::new(2), Slot::connecting(2));
        assert_eq!(table.first_absent(), Some(SlotId::new(1)));

        table.insert(SlotId::new(1), Slot::connecting(3));
        assert_eq!(table.first_absent(), None);
        assert_eq!(table.count(SlotState::Connecting), 3);
    }

    #[test]
    fn remove_makes_index_reusable() {
        let mut table = Table::with_capacity(2).unwrap();
        table.insert(SlotId::new(0), Slot::connecting(1));
        table.get_mut(SlotId::new(0)).unwrap().state = SlotState::Connected;
        assert_eq!(
            table.first_in_state(SlotState::Connected),
            Some(SlotId::new(0))
        );

        assert!(table.remove(SlotId::new(0)).is_some());
        assert!(table.remove(SlotId::new(0)).is_none());
        assert_eq!(table.first_absent(), Some(SlotId::new(0)));
    }

    #[test]
    fn info_reports_state_and_context() {
        let mut table = Table::with_capacity(1).unwrap();
        table.insert(SlotId::new(0), Slot::connecting(1));
        table.get_mut(SlotId::new(0)).unwrap().ctx = Some(Rc::new(42u32));

        let info = table.info(SlotId::new(0)).unwrap();
        assert_eq!(info.state, SlotState::Connecting);
        let ctx = info.ctx.unwrap();
        assert_eq!(ctx.downcast_ref::<u32>(), Some(&42));
    }
}

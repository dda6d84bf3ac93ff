//! Fixed-capacity arena of per-limit state with an occupancy bitset.
//!
//! Callers only ever see [`ActiveHandle`]s. A handle is neither `Clone` nor
//! `Copy`, and [`ActivePool::release`] consumes it, so a released slot can no
//! longer be reached through the handle that named it.

use tracing::debug;

use crate::bitset::BitSet255;
use crate::error::{PerfError, Result};
use crate::types::ClientInput;

pub const ACTIVE_POOL_CAPACITY: usize = 32;

/// State held for an enabled limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveSlotState {
    pub input: ClientInput,
}

/// Owning reference to one acquired slot.
#[derive(Debug, PartialEq, Eq)]
pub struct ActiveHandle {
    slot: usize,
}

impl ActiveHandle {
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

#[derive(Debug)]
pub struct ActivePool<T, const N: usize> {
    slots: [T; N],
    occupied: BitSet255,
}

impl<T: Default, const N: usize> Default for ActivePool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default, const N: usize> ActivePool<T, N> {
    pub fn new() -> Self {
        assert!(N <= BitSet255::capacity(), "active pool capacity exceeds occupancy mask");
        Self {
            slots: std::array::from_fn(|_| T::default()),
            occupied: BitSet255::new(N),
        }
    }
}

impl<T, const N: usize> ActivePool<T, N> {
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn in_use(&self) -> usize {
        self.occupied.count_set()
    }

    pub fn occupied(&self) -> &BitSet255 {
        &self.occupied
    }

    /// Take the lowest free slot and store `state` in it.
    pub fn acquire(&mut self, state: T) -> Result<ActiveHandle> {
        let slot = self
            .occupied
            .lowest_clear_index()
            .ok_or(PerfError::NoFreeMem { capacity: N })?;
        self.occupied.set(slot);
        self.slots[slot] = state;
        debug!(slot, in_use = self.in_use(), "active slot acquired");
        Ok(ActiveHandle { slot })
    }

    /// Return the slot to the pool. Stored data is left in place.
    pub fn release(&mut self, handle: ActiveHandle) {
        assert!(self.occupied.get(handle.slot), "release of a slot that is not acquired");
        self.occupied.clear(handle.slot);
        debug!(slot = handle.slot, in_use = self.in_use(), "active slot released");
    }

    pub fn get(&self, handle: &ActiveHandle) -> &T {
        assert!(self.occupied.get(handle.slot), "access through a handle that is not acquired");
        &self.slots[handle.slot]
    }

    /// Overwrite the state of an acquired slot.
    pub fn replace(&mut self, handle: &ActiveHandle, state: T) -> T {
        assert!(self.occupied.get(handle.slot), "access through a handle that is not acquired");
        std::mem::replace(&mut self.slots[handle.slot], state)
    }
}

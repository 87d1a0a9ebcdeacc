//! Positional record storage.
//!
//! A fixed array of slots, each holding one input record and one output
//! record. Logical positions are unbounded and map onto slots by
//! `position mod capacity`, so positions `p` and `p + capacity` share a slot.
//!
//! # Write-once holders
//!
//! A holder must be empty before it is set. Setting an occupied holder is a
//! [`Conflict`]; the channel's writer empties it first with
//! [`RingStore::reclaim`] once every reader has moved past the old position.
//!
//! # Thread Safety
//!
//! Each holder has its own lock, held only for the duration of a pointer-sized
//! swap or a refcount bump. No lock covers more than one holder.

use crate::ring::{RingConfig, position_to_index};
use bytes::Bytes;
use crater_protocol::Channel;
use parking_lot::Mutex;

/// Opaque record bytes. Clones share the allocation.
pub type Record = Bytes;

/// The holder addressed by a `set` already had a record in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{channel} holder for position {position} is occupied")]
pub struct Conflict {
    pub position: u64,
    pub channel: Channel,
}

#[derive(Default)]
struct Slot {
    holders: [Mutex<Option<Record>>; 2],
}

impl Slot {
    #[inline(always)]
    fn holder(&self, channel: Channel) -> &Mutex<Option<Record>> {
        &self.holders[channel.index()]
    }
}

pub struct RingStore {
    slots: Box<[Slot]>,
    capacity: u64,
}

impl RingStore {
    /// Allocates `cfg.capacity` empty slots.
    pub fn new(cfg: RingConfig) -> Self {
        let slots = (0..cfg.capacity).map(|_| Slot::default()).collect();
        Self {
            slots,
            capacity: cfg.capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline(always)]
    fn slot(&self, position: u64) -> &Slot {
        // position_to_index is always < capacity == slots.len()
        &self.slots[position_to_index(position, self.capacity) as usize]
    }

    /// Returns the record held for `position` on `channel`, if any.
    #[inline]
    pub fn get(&self, position: u64, channel: Channel) -> Option<Record> {
        self.slot(position).holder(channel).lock().clone()
    }

    /// Stores `record` at `position` on `channel`.
    ///
    /// # Errors
    /// [`Conflict`] if the holder is occupied; the existing record is kept.
    pub fn set(&self, position: u64, channel: Channel, record: Record) -> Result<(), Conflict> {
        let mut holder = self.slot(position).holder(channel).lock();
        if holder.is_some() {
            return Err(Conflict { position, channel });
        }
        *holder = Some(record);
        Ok(())
    }

    /// Empties the holder for `position` on `channel`, returning its record.
    ///
    /// Only the channel's writer calls this, and only for positions every
    /// reader of the channel has already passed.
    pub fn reclaim(&self, position: u64, channel: Channel) -> Option<Record> {
        self.slot(position).holder(channel).lock().take()
    }

    /// Number of occupied holders on `channel`. Walks every slot.
    pub fn occupied(&self, channel: Channel) -> usize {
        self.slots
            .iter()
            .filter(|s| s.holder(channel).lock().is_some())
            .count()
    }
}

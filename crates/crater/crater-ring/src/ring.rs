//! Ring configuration, position arithmetic, and the batch read/write paths.
//!
//! The ring pairs a [`RingStore`] with the [`Tracker`] of every actor's
//! cursor. Reads and writes are bounded by the boundaries in
//! [`crate::watermark`]; nothing here blocks.

use crate::cursor::{CursorHandle, Tracker};
use crate::store::{Conflict, Record, RingStore};
use crater_protocol::Channel;

/// Configuration for a ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of slots. Any non-zero value.
    pub capacity: u64,
}

impl RingConfig {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");
        Self { capacity }
    }
}

/// Maps a logical position onto a slot index in `[0, capacity)`.
///
/// ```text
/// capacity = 4
/// position = 0 → 0
/// position = 3 → 3
/// position = 4 → 0   (second lap)
/// position = 9 → 1
/// ```
#[inline(always)]
pub fn position_to_index(position: u64, capacity: u64) -> u64 {
    position % capacity
}

/// Limits applied to one batch read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBudget {
    /// Most records to return.
    pub records: u64,
    /// Most payload bytes to return, summed over records.
    pub bytes: u64,
    /// Most encoded bytes: payload plus `overhead` per record.
    pub encoded: u64,
    /// Fixed encoding cost of each record.
    pub overhead: u64,
}

impl ReadBudget {
    pub const UNLIMITED: Self = Self {
        records: u64::MAX,
        bytes: u64::MAX,
        encoded: u64::MAX,
        overhead: 0,
    };

    pub fn records(n: u64) -> Self {
        Self {
            records: n,
            ..Self::UNLIMITED
        }
    }

    pub fn bytes(n: u64) -> Self {
        Self {
            bytes: n,
            ..Self::UNLIMITED
        }
    }
}

/// Records returned by [`Ring::read`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadBatch {
    pub records: Vec<Record>,
    /// Position the reader continues from.
    pub next: u64,
}

/// Shared ring state: slots plus every cursor.
pub struct Ring {
    config: RingConfig,
    store: RingStore,
    tracker: Tracker,
}

impl Ring {
    pub fn new(config: RingConfig) -> Self {
        Self {
            config,
            store: RingStore::new(config),
            tracker: Tracker::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    #[inline]
    pub fn store(&self) -> &RingStore {
        &self.store
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Cursor allocation is only possible while the ring is exclusively owned.
    #[inline]
    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    /// Reads `channel` from `from`, stepping by `stride`.
    ///
    /// Stops at the first of: the channel's read boundary, a missing record,
    /// or the next record breaking any bound in `budget`. Cursors are not
    /// touched; the caller decides what to advance.
    pub fn read(&self, from: u64, stride: u64, channel: Channel, budget: ReadBudget) -> ReadBatch {
        let boundary = self.tracker.read_boundary(channel);
        let stride = stride.max(1);
        let mut batch = ReadBatch {
            records: Vec::new(),
            next: from,
        };
        let mut bytes = 0u64;
        let mut encoded = 0u64;

        while batch.next < boundary && (batch.records.len() as u64) < budget.records {
            let Some(record) = self.store.get(batch.next, channel) else {
                tracing::warn!(position = batch.next, %channel, "hole below read boundary");
                break;
            };
            let len = record.len() as u64;
            let next_bytes = bytes.saturating_add(len);
            let next_encoded = encoded.saturating_add(len).saturating_add(budget.overhead);
            if next_bytes > budget.bytes || next_encoded > budget.encoded {
                break;
            }
            bytes = next_bytes;
            encoded = next_encoded;
            batch.records.push(record);
            batch.next = batch.next.saturating_add(stride);
        }
        batch
    }

    /// Stores `records` on `channel` at consecutive positions from the
    /// writer's cursor, advancing it once per record stored.
    ///
    /// Stops without error at the channel's write boundary and returns how
    /// many records were stored; the rest are not stored.
    ///
    /// # Errors
    /// [`Conflict`] if a holder was unexpectedly occupied. Records stored
    /// before it remain stored and counted in the cursor.
    pub fn write<I>(&self, writer: CursorHandle, channel: Channel, records: I) -> Result<usize, Conflict>
    where
        I: IntoIterator<Item = Record>,
    {
        let capacity = self.capacity();
        let boundary = self.tracker.write_boundary(channel, capacity);
        let mut position = self.tracker.position(writer);
        let mut stored = 0usize;

        for record in records {
            if position >= boundary {
                break;
            }
            if let Some(previous_lap) = position.checked_sub(capacity) {
                self.store.reclaim(previous_lap, channel);
            }
            self.store.set(position, channel, record)?;
            position = self.tracker.advance(writer, 1);
            stored += 1;
        }
        Ok(stored)
    }
}

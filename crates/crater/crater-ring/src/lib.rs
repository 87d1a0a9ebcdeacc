//! Bounded positional ring shared by one producer, one transformer and any
//! number of consumers, each tracked by its own cursor.

mod cursor;
mod ring;
mod store;
mod watermark;

pub use cursor::{AllocError, Cursor, CursorHandle, Reservation, Tracker};
pub use ring::{ReadBatch, ReadBudget, Ring, RingConfig, position_to_index};
pub use store::{Conflict, Record, RingStore};

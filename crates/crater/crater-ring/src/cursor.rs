//! Per-actor cursors.
//!
//! Every connected actor owns one cursor: a monotonically increasing
//! position plus a stride. Cursors live in an arena and are addressed by
//! [`CursorHandle`]; handles stay valid for the tracker's lifetime.
//!
//! # Thread Safety
//!
//! The arena itself is only mutated through `&mut Tracker` while the roster
//! is assembling. Once shared, positions are the only mutable state: the
//! owning worker advances its cursor with Release stores and every other
//! worker observes it with Acquire loads.

use crater_protocol::Role;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable reference to a cursor in a [`Tracker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CursorHandle(usize);

impl CursorHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct Cursor {
    role: Role,
    stride: u64,
    position: AtomicU64,
}

impl Cursor {
    fn new(role: Role, stride: u64) -> Self {
        Self {
            role,
            stride,
            position: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The arena could not grow.
    #[error("cursor arena exhausted")]
    Exhausted,
    /// A producer or transformer cursor already exists.
    #[error("a {0} cursor is already allocated")]
    RoleTaken(Role),
}

#[derive(Debug, Default)]
pub struct Tracker {
    cursors: Vec<Cursor>,
    producer: Option<CursorHandle>,
    transformer: Option<CursorHandle>,
    consumers: Vec<CursorHandle>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a cursor with stride 1. See [`Tracker::reserve_with_stride`].
    pub fn reserve(&mut self, role: Role) -> Result<Reservation<'_>, AllocError> {
        self.reserve_with_stride(role, 1)
    }

    /// Reserves a cursor at position 0.
    ///
    /// The cursor exists immediately but is released again when the returned
    /// [`Reservation`] drops without [`Reservation::commit`]. While the
    /// reservation lives the tracker is borrowed, so nothing else can be
    /// allocated in between.
    ///
    /// Writers always step by 1; `stride` only applies to consumers and is
    /// raised to 1 if zero.
    pub fn reserve_with_stride(
        &mut self,
        role: Role,
        stride: u64,
    ) -> Result<Reservation<'_>, AllocError> {
        let stride = match role {
            Role::Consumer => stride.max(1),
            Role::Producer | Role::Transformer => 1,
        };
        let taken = match role {
            Role::Producer => self.producer.is_some(),
            Role::Transformer => self.transformer.is_some(),
            Role::Consumer => false,
        };
        if taken {
            return Err(AllocError::RoleTaken(role));
        }
        self.cursors
            .try_reserve(1)
            .map_err(|_| AllocError::Exhausted)?;
        if role == Role::Consumer {
            self.consumers
                .try_reserve(1)
                .map_err(|_| AllocError::Exhausted)?;
        }

        let handle = CursorHandle(self.cursors.len());
        self.cursors.push(Cursor::new(role, stride));
        match role {
            Role::Producer => self.producer = Some(handle),
            Role::Transformer => self.transformer = Some(handle),
            Role::Consumer => self.consumers.push(handle),
        }
        Ok(Reservation {
            tracker: self,
            handle,
            committed: false,
        })
    }

    /// Reserves and immediately commits a cursor.
    pub fn allocate(&mut self, role: Role) -> Result<CursorHandle, AllocError> {
        Ok(self.reserve(role)?.commit())
    }

    /// Undoes the most recent allocation. Only [`Reservation`] calls this.
    fn release_last(&mut self, handle: CursorHandle) {
        debug_assert_eq!(handle.0 + 1, self.cursors.len());
        if let Some(cursor) = self.cursors.pop() {
            match cursor.role {
                Role::Producer => self.producer = None,
                Role::Transformer => self.transformer = None,
                Role::Consumer => {
                    self.consumers.pop();
                }
            }
        }
    }

    /// # Panics
    /// Panics if `handle` came from a different tracker.
    #[inline]
    pub fn cursor(&self, handle: CursorHandle) -> &Cursor {
        &self.cursors[handle.0]
    }

    #[inline]
    pub fn position(&self, handle: CursorHandle) -> u64 {
        self.cursor(handle).position()
    }

    /// Moves the cursor forward by `n` strides and returns the new position.
    ///
    /// Saturates at `u64::MAX` instead of wrapping. Only the cursor's owner
    /// calls this.
    pub fn advance(&self, handle: CursorHandle, n: u64) -> u64 {
        let cursor = self.cursor(handle);
        let delta = n.saturating_mul(cursor.stride);
        let prev = cursor
            .position
            .fetch_update(Ordering::Release, Ordering::Relaxed, |p| {
                Some(p.saturating_add(delta))
            })
            .unwrap_or_else(|p| p);
        prev.saturating_add(delta)
    }

    #[inline]
    pub fn producer(&self) -> Option<CursorHandle> {
        self.producer
    }

    #[inline]
    pub fn transformer(&self) -> Option<CursorHandle> {
        self.transformer
    }

    #[inline]
    pub fn consumers(&self) -> &[CursorHandle] {
        &self.consumers
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// `(handle, role, position)` for every cursor, in allocation order.
    pub fn snapshot(&self) -> Vec<(CursorHandle, Role, u64)> {
        self.cursors
            .iter()
            .enumerate()
            .map(|(i, c)| (CursorHandle(i), c.role, c.position()))
            .collect()
    }
}

/// A cursor that exists but is not yet kept.
///
/// Dropping it releases the cursor; [`Reservation::commit`] keeps it.
#[must_use = "a reservation is released when dropped"]
#[derive(Debug)]
pub struct Reservation<'a> {
    tracker: &'a mut Tracker,
    handle: CursorHandle,
    committed: bool,
}

impl Reservation<'_> {
    #[inline]
    pub fn handle(&self) -> CursorHandle {
        self.handle
    }

    pub fn commit(mut self) -> CursorHandle {
        self.committed = true;
        self.handle
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.tracker.release_last(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cursor_starts_at_zero_with_unit_stride() {
        let mut t = Tracker::new();
        let h = t.allocate(Role::Consumer).unwrap();
        assert_eq!(t.position(h), 0);
        assert_eq!(t.cursor(h).stride(), 1);
        assert_eq!(t.cursor(h).role(), Role::Consumer);
        assert_eq!(t.consumers(), &[h]);
    }

    #[test]
    fn singleton_roles_are_allocated_once() {
        let mut t = Tracker::new();
        let p = t.allocate(Role::Producer).unwrap();
        assert_eq!(t.producer(), Some(p));
        assert_eq!(
            t.allocate(Role::Producer),
            Err(AllocError::RoleTaken(Role::Producer))
        );
        t.allocate(Role::Transformer).unwrap();
        assert_eq!(
            t.allocate(Role::Transformer),
            Err(AllocError::RoleTaken(Role::Transformer))
        );
        t.allocate(Role::Consumer).unwrap();
        t.allocate(Role::Consumer).unwrap();
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn dropped_reservation_releases_the_cursor() {
        let mut t = Tracker::new();
        t.allocate(Role::Consumer).unwrap();
        {
            let r = t.reserve(Role::Producer).unwrap();
            assert_eq!(r.handle().index(), 1);
        }
        assert_eq!(t.len(), 1);
        assert_eq!(t.producer(), None);
        {
            let _r = t.reserve(Role::Consumer).unwrap();
        }
        assert_eq!(t.consumers().len(), 1);

        let p = t.reserve(Role::Producer).unwrap().commit();
        assert_eq!(t.producer(), Some(p));
    }

    #[test]
    fn advance_applies_stride_and_is_monotonic() {
        let mut t = Tracker::new();
        let c = t.reserve_with_stride(Role::Consumer, 3).unwrap().commit();
        assert_eq!(t.advance(c, 2), 6);
        assert_eq!(t.advance(c, 0), 6);
        assert_eq!(t.advance(c, 1), 9);
        assert_eq!(t.position(c), 9);
    }

    #[test]
    fn writers_ignore_requested_stride() {
        let mut t = Tracker::new();
        let p = t.reserve_with_stride(Role::Producer, 4).unwrap().commit();
        assert_eq!(t.cursor(p).stride(), 1);
        let c = t.reserve_with_stride(Role::Consumer, 0).unwrap().commit();
        assert_eq!(t.cursor(c).stride(), 1);
    }

    #[test]
    fn advance_saturates_instead_of_wrapping() {
        let mut t = Tracker::new();
        let c = t.allocate(Role::Consumer).unwrap();
        t.advance(c, u64::MAX);
        assert_eq!(t.advance(c, 5), u64::MAX);
    }
}

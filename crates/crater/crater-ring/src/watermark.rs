//! Read and write boundaries derived from cursor positions.
//!
//! Readers stop at the channel's writer:
//! - input is readable below the producer's position
//! - output is readable below the transformer's position
//!
//! Writers stop one lap ahead of the slowest reader of their channel:
//! - `input_watermark  = min(producer, transformer, every consumer)`
//! - `output_watermark = min(transformer, every consumer)`
//!
//! The producer may store position `q` only while `q < input_watermark + L`.
//! The transformer may store `q` only while `q < producer` and
//! `q < output_watermark + L`. Every position below a channel's watermark has
//! been passed by all of that channel's readers, so the writer may reclaim
//! `q - L` before storing `q`.
//!
//! All cursor loads are Acquire. A stale value is always smaller than the
//! current one, so a stale boundary is conservative.

use crate::cursor::Tracker;
use crater_protocol::Channel;

impl Tracker {
    #[inline]
    fn position_of(&self, handle: Option<crate::CursorHandle>) -> Option<u64> {
        handle.map(|h| self.position(h))
    }

    fn min_consumer(&self) -> Option<u64> {
        self.consumers().iter().map(|&h| self.position(h)).min()
    }

    /// Lowest position any reader of the input channel may still need.
    pub fn input_watermark(&self) -> u64 {
        [
            self.position_of(self.producer()),
            self.position_of(self.transformer()),
            self.min_consumer(),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(0)
    }

    /// Lowest position any reader of the output channel may still need.
    pub fn output_watermark(&self) -> u64 {
        [self.position_of(self.transformer()), self.min_consumer()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(0)
    }

    /// First position a reader of `channel` may not read.
    pub fn read_boundary(&self, channel: Channel) -> u64 {
        let writer = match channel {
            Channel::Input => self.producer(),
            Channel::Output => self.transformer(),
        };
        self.position_of(writer).unwrap_or(0)
    }

    /// First position the writer of `channel` may not store.
    pub fn write_boundary(&self, channel: Channel, capacity: u64) -> u64 {
        match channel {
            Channel::Input => self.input_watermark().saturating_add(capacity),
            Channel::Output => {
                let produced = self.position_of(self.producer()).unwrap_or(0);
                produced.min(self.output_watermark().saturating_add(capacity))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crater_protocol::Role;

    #[test]
    fn empty_tracker_has_zero_boundaries() {
        let t = Tracker::new();
        assert_eq!(t.input_watermark(), 0);
        assert_eq!(t.read_boundary(Channel::Input), 0);
        assert_eq!(t.write_boundary(Channel::Input, 4), 4);
        assert_eq!(t.write_boundary(Channel::Output, 4), 0);
    }

    #[test]
    fn reads_stop_at_the_channel_writer() {
        let mut t = Tracker::new();
        let p = t.allocate(Role::Producer).unwrap();
        let x = t.allocate(Role::Transformer).unwrap();
        t.advance(p, 5);
        t.advance(x, 2);
        assert_eq!(t.read_boundary(Channel::Input), 5);
        assert_eq!(t.read_boundary(Channel::Output), 2);
    }

    #[test]
    fn slowest_reader_holds_the_input_watermark() {
        let mut t = Tracker::new();
        let p = t.allocate(Role::Producer).unwrap();
        let x = t.allocate(Role::Transformer).unwrap();
        let fast = t.allocate(Role::Consumer).unwrap();
        let slow = t.allocate(Role::Consumer).unwrap();
        t.advance(p, 8);
        t.advance(x, 6);
        t.advance(fast, 5);
        t.advance(slow, 3);

        assert_eq!(t.input_watermark(), 3);
        assert_eq!(t.output_watermark(), 3);
        assert_eq!(t.write_boundary(Channel::Input, 4), 7);
        // transformer is bound by what the producer has stored
        assert_eq!(t.write_boundary(Channel::Output, 16), 8);
        assert_eq!(t.write_boundary(Channel::Output, 4), 7);
    }

    #[test]
    fn untransformed_input_holds_the_producer_back() {
        let mut t = Tracker::new();
        let p = t.allocate(Role::Producer).unwrap();
        let x = t.allocate(Role::Transformer).unwrap();
        t.advance(p, 4);
        assert_eq!(t.write_boundary(Channel::Input, 4), 4);
        t.advance(x, 1);
        assert_eq!(t.write_boundary(Channel::Input, 4), 5);
    }

    #[test]
    fn lone_producer_is_bounded_by_itself() {
        let mut t = Tracker::new();
        let p = t.allocate(Role::Producer).unwrap();
        t.advance(p, 10);
        assert_eq!(t.input_watermark(), 10);
        assert_eq!(t.write_boundary(Channel::Input, 4), 14);
    }
}

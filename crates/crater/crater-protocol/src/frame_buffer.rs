use crate::codec::{FrameHeader, HEADER_LEN, decode_body, peek_header};
use crate::error::FramingError;
use crate::message::Message;
use bytes::{Bytes, BytesMut};
use std::io::{self, Read};

/// Bytes requested from the source per read when no frame size is known.
pub const READ_CHUNK: usize = 4 * 1024;

/// Upper bound on a single read, even when a large frame is pending.
const MAX_READ_CHUNK: usize = 1024 * 1024;

/// Records shorter than this are copied out of the window when decoded.
pub const SHARE_MIN: usize = 4 * 1024;

/// Accumulates bytes from a stream and hands out whole frames.
///
/// A linear sliding window: decoded frames are split off the front, the
/// remainder stays in place for the next read.
///
/// Record payloads of at least [`SHARE_MIN`] bytes share the window's
/// allocation instead of being copied. A shared record keeps that whole
/// allocation alive (up to one read chunk beyond its frame) for as long as
/// the record is held. Shorter records get their own allocation.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(READ_CHUNK)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Performs one `read` from `src` into the window and returns its count.
    ///
    /// `Ok(0)` means end of stream. When the window already holds the header
    /// of a larger frame, the read is sized toward the missing bytes so the
    /// frame completes in few reads.
    pub fn read_from<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<usize> {
        let missing = match peek_header(&self.buf) {
            Ok(Some(header)) => header.frame_len().saturating_sub(self.buf.len()),
            _ => 0,
        };
        let chunk = missing.clamp(READ_CHUNK, MAX_READ_CHUNK);

        let start = self.buf.len();
        self.buf.resize(start + chunk, 0);
        match src.read(&mut self.buf[start..]) {
            Ok(n) => {
                self.buf.truncate(start + n);
                Ok(n)
            }
            Err(e) => {
                self.buf.truncate(start);
                Err(e)
            }
        }
    }

    /// Header of the frame at the front of the window, once its first
    /// [`HEADER_LEN`] bytes have arrived.
    pub fn peek_header(&self) -> Result<Option<FrameHeader>, FramingError> {
        peek_header(&self.buf)
    }

    /// Removes and returns the next complete frame, if the window holds one.
    ///
    /// `Ok(None)` leaves the window untouched. A framing error leaves the
    /// window in an unspecified state; the connection is expected to close.
    pub fn next_message(&mut self) -> Result<Option<Message>, FramingError> {
        let Some(header) = peek_header(&self.buf)? else {
            return Ok(None);
        };
        let total = header.frame_len();
        if self.buf.len() < total {
            return Ok(None);
        }
        let mut frame = self.buf.split_to(total).freeze();
        let body = frame.split_off(HEADER_LEN);
        let mut message = decode_body(header.id, body)?;
        if let Message::GiveData(batch) = &mut message {
            for record in batch.records.iter_mut().filter(|r| r.len() < SHARE_MIN) {
                *record = Bytes::copy_from_slice(record);
            }
        }
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Channel, Configure, GetData, GiveData, Limit, Role};
    use bytes::Bytes;
    use std::io::Cursor;

    fn sample() -> Vec<Message> {
        vec![
            Message::Configure(Configure { role: Role::Producer }),
            Message::GiveData(GiveData {
                channel: Channel::Input,
                records: vec![
                    Bytes::from_static(b"a"),
                    Bytes::new(),
                    Bytes::from(vec![7u8; 300]),
                ],
            }),
            Message::GetData(GetData {
                channel: Channel::Output,
                limit: Limit::Bytes(64),
            }),
        ]
    }

    fn wire(messages: &[Message]) -> Vec<u8> {
        let mut out = BytesMut::new();
        for m in messages {
            m.encode(&mut out);
        }
        out.to_vec()
    }

    fn drain(buf: &mut FrameBuffer) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(m) = buf.next_message().unwrap() {
            out.push(m);
        }
        out
    }

    #[test]
    fn split_at_every_byte_decodes_like_whole() {
        let messages = sample();
        let bytes = wire(&messages);
        for cut in 0..=bytes.len() {
            let mut buf = FrameBuffer::new();
            buf.extend_from_slice(&bytes[..cut]);
            let mut got = drain(&mut buf);
            buf.extend_from_slice(&bytes[cut..]);
            got.extend(drain(&mut buf));
            assert_eq!(got, messages, "split at byte {cut}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn byte_at_a_time_decodes_like_whole() {
        let messages = sample();
        let bytes = wire(&messages);
        let mut buf = FrameBuffer::new();
        let mut got = Vec::new();
        for b in &bytes {
            buf.extend_from_slice(std::slice::from_ref(b));
            got.extend(drain(&mut buf));
        }
        assert_eq!(got, messages);
    }

    #[test]
    fn small_records_do_not_pin_the_window() {
        let small = Bytes::from_static(b"tiny");
        let large = Bytes::from(vec![9u8; SHARE_MIN]);
        let batch = Message::GiveData(GiveData {
            channel: Channel::Input,
            records: vec![small.clone(), large.clone()],
        });
        let mut buf = FrameBuffer::new();
        buf.extend_from_slice(&wire(std::slice::from_ref(&batch)));

        let Some(Message::GiveData(decoded)) = buf.next_message().unwrap() else {
            panic!("expected GIVE_DATA");
        };
        assert_eq!(decoded.records, vec![small, large]);
        // On the wire the small record is directly followed by the large
        // record's length prefix.
        let small_end = decoded.records[0].as_ptr() as usize + decoded.records[0].len();
        let large_start = decoded.records[1].as_ptr() as usize;
        assert_ne!(small_end + 8, large_start);
    }

    #[test]
    fn incomplete_frame_is_not_consumed() {
        let bytes = wire(&sample()[1..2]);
        let mut buf = FrameBuffer::new();
        buf.extend_from_slice(&bytes[..bytes.len() - 1]);
        assert_eq!(buf.next_message(), Ok(None));
        assert_eq!(buf.len(), bytes.len() - 1);
    }

    #[test]
    fn read_from_accumulates_until_a_frame_completes() {
        let big = Message::GiveData(GiveData {
            channel: Channel::Input,
            records: vec![Bytes::from(vec![1u8; 3 * READ_CHUNK])],
        });
        let bytes = wire(std::slice::from_ref(&big));
        let mut src = Cursor::new(bytes.clone());
        let mut buf = FrameBuffer::new();

        let mut reads = 0;
        let decoded = loop {
            if let Some(m) = buf.next_message().unwrap() {
                break m;
            }
            let n = buf.read_from(&mut src).unwrap();
            assert!(n > 0, "source ended before the frame completed");
            reads += 1;
        };
        assert_eq!(decoded, big);
        assert!(reads >= 2);
        assert_eq!(buf.read_from(&mut src).unwrap(), 0);
    }
}

//! Frame encoding and decoding.
//!
//! Every message travels as one length-prefixed frame. Integers are
//! little-endian.
//!
//! ```text
//! ┌────────────────────┬───────────────┬──────────────────────────────┐
//! │ body_len (u64 LE)  │ message_id u8 │ body (body_len bytes)        │
//! └────────────────────┴───────────────┴──────────────────────────────┘
//!
//! CONFIGURE  body := role u8                                  (1 byte)
//! GET_DATA   body := channel u8 | limit_kind u8 | limit u64   (10 bytes)
//! GIVE_DATA  body := channel u8 | count u64 | { len u64 | bytes }*count
//! ```
//!
//! `body_len` excludes the message id byte. A decoder needs the full frame
//! before it produces a message; short input yields [`Decoded::Incomplete`]
//! and consumes nothing. Inputs that can never form a valid frame (oversized
//! prefix, unknown ids, inconsistent lengths) are a [`FramingError`].

use crate::error::FramingError;
use crate::message::{Channel, Configure, GetData, GiveData, Limit, Message, MessageId, Role};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the `body_len` prefix.
pub const LEN_PREFIX: usize = 8;

/// Size of the prefix plus the message id.
pub const HEADER_LEN: usize = LEN_PREFIX + 1;

/// Largest `body_len` a peer may declare (~16.7 MB).
pub const MAX_BODY_LEN: u64 = 0x00FF_FFFF - LEN_PREFIX as u64;

pub const CONFIGURE_BODY_LEN: u64 = 1;
pub const GET_DATA_BODY_LEN: u64 = 10;

/// Fixed part of a GIVE_DATA body: channel byte plus record count.
pub const GIVE_DATA_FIXED_LEN: u64 = 9;

/// Per-record length prefix inside a GIVE_DATA body.
pub const RECORD_PREFIX_LEN: u64 = 8;

/// Outcome of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Not enough bytes yet; nothing was consumed.
    Incomplete,
    /// One full frame; the first `consumed` bytes of the input belong to it.
    Frame { message: Message, consumed: usize },
}

impl Decoded {
    pub fn consumed(&self) -> usize {
        match self {
            Decoded::Incomplete => 0,
            Decoded::Frame { consumed, .. } => *consumed,
        }
    }
}

/// Validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: MessageId,
    pub body_len: u64,
}

impl FrameHeader {
    /// Total bytes of the frame, header included.
    #[inline]
    pub fn frame_len(&self) -> usize {
        // body_len <= MAX_BODY_LEN, which fits any supported usize
        HEADER_LEN + self.body_len as usize
    }
}

/// Reads the header at the start of `buf`.
///
/// The length bound is checked as soon as the 8-byte prefix is present, so
/// an oversized frame is refused before any of its body is buffered.
pub fn peek_header(buf: &[u8]) -> Result<Option<FrameHeader>, FramingError> {
    let Some(prefix) = buf.get(..LEN_PREFIX) else {
        return Ok(None);
    };
    let mut prefix = prefix;
    let body_len = prefix.get_u64_le();
    if body_len > MAX_BODY_LEN {
        return Err(FramingError::Oversized {
            len: body_len,
            max: MAX_BODY_LEN,
        });
    }
    let Some(&id) = buf.get(LEN_PREFIX) else {
        return Ok(None);
    };
    let id = MessageId::try_from(id)?;
    Ok(Some(FrameHeader { id, body_len }))
}

/// Decodes one frame from the start of `buf` without consuming it.
pub fn decode_frame(buf: &[u8]) -> Result<Decoded, FramingError> {
    let Some(header) = peek_header(buf)? else {
        return Ok(Decoded::Incomplete);
    };
    let total = header.frame_len();
    let Some(frame) = buf.get(..total) else {
        return Ok(Decoded::Incomplete);
    };
    let body = Bytes::copy_from_slice(&frame[HEADER_LEN..]);
    let message = decode_body(header.id, body)?;
    Ok(Decoded::Frame {
        message,
        consumed: total,
    })
}

fn expect_body_len(id: MessageId, expected: u64, actual: u64) -> Result<(), FramingError> {
    if expected != actual {
        return Err(FramingError::BodyLength {
            message: id,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Decodes a body whose length already matches its header.
///
/// GIVE_DATA records are sliced out of `body` without copying.
pub(crate) fn decode_body(id: MessageId, mut body: Bytes) -> Result<Message, FramingError> {
    let actual = body.len() as u64;
    match id {
        MessageId::Configure => {
            expect_body_len(id, CONFIGURE_BODY_LEN, actual)?;
            let role = Role::try_from(body.get_u8())?;
            Ok(Message::Configure(Configure { role }))
        }
        MessageId::GetData => {
            expect_body_len(id, GET_DATA_BODY_LEN, actual)?;
            let channel = Channel::try_from(body.get_u8())?;
            let kind = body.get_u8();
            let limit = Limit::from_wire(kind, body.get_u64_le())?;
            Ok(Message::GetData(GetData { channel, limit }))
        }
        MessageId::GiveData => {
            if actual < GIVE_DATA_FIXED_LEN {
                return Err(FramingError::BodyLength {
                    message: id,
                    expected: GIVE_DATA_FIXED_LEN,
                    actual,
                });
            }
            let channel = Channel::try_from(body.get_u8())?;
            let count = body.get_u64_le();
            // `count` is peer-controlled; every record costs at least its prefix
            let bound = body.len() as u64 / RECORD_PREFIX_LEN;
            let mut records = Vec::with_capacity(count.min(bound) as usize);
            for index in 0..count {
                if (body.len() as u64) < RECORD_PREFIX_LEN {
                    return Err(FramingError::RecordOverrun {
                        index,
                        needed: RECORD_PREFIX_LEN,
                        remaining: body.len() as u64,
                    });
                }
                let len = body.get_u64_le();
                if len > body.len() as u64 {
                    return Err(FramingError::RecordOverrun {
                        index,
                        needed: len,
                        remaining: body.len() as u64,
                    });
                }
                records.push(body.split_to(len as usize));
            }
            if !body.is_empty() {
                return Err(FramingError::TrailingBytes(body.len() as u64));
            }
            Ok(Message::GiveData(GiveData { channel, records }))
        }
    }
}

/// Encoded size of one record inside a GIVE_DATA body.
#[inline]
pub fn record_cost(len: u64) -> u64 {
    RECORD_PREFIX_LEN + len
}

impl Message {
    /// Value of the `body_len` prefix for this message.
    pub fn body_len(&self) -> u64 {
        match self {
            Message::Configure(_) => CONFIGURE_BODY_LEN,
            Message::GetData(_) => GET_DATA_BODY_LEN,
            Message::GiveData(m) => m.body_len(),
        }
    }

    /// Appends the full frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN + self.body_len() as usize);
        dst.put_u64_le(self.body_len());
        dst.put_u8(self.id() as u8);
        match self {
            Message::Configure(m) => dst.put_u8(m.role as u8),
            Message::GetData(m) => {
                dst.put_u8(m.channel as u8);
                dst.put_u8(m.limit.kind());
                dst.put_u64_le(m.limit.value());
            }
            Message::GiveData(m) => {
                dst.put_u8(m.channel as u8);
                dst.put_u64_le(m.records.len() as u64);
                for record in &m.records {
                    dst.put_u64_le(record.len() as u64);
                    dst.put_slice(record);
                }
            }
        }
    }

    /// Encodes into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }
}

impl GiveData {
    pub fn body_len(&self) -> u64 {
        self.records
            .iter()
            .fold(GIVE_DATA_FIXED_LEN, |acc, r| acc + record_cost(r.len() as u64))
    }
}

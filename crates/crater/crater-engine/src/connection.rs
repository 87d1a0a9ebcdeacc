//! One actor's connection, from handshake to close.
//!
//! ```text
//! Handshake ──configure()──▶ Configured ──(admitted)──▶ Connection ──run()──▶ Closed
//! Connecting   Configuring                               Active
//! ```
//!
//! The handshake blocks on its own socket until a CONFIGURE frame arrives.
//! An active connection loops: read what the socket has, decode every whole
//! frame, apply each through this connection's cursor, flush the replies.

use crate::error::ConnectionError;
use bytes::BytesMut;
use crater_protocol::codec::{CONFIGURE_BODY_LEN, GIVE_DATA_FIXED_LEN, RECORD_PREFIX_LEN};
use crater_protocol::{
    Channel, FrameBuffer, FramingError, GetData, GiveData, Limit, MAX_BODY_LEN, Message,
    MessageId, Role,
};
use crater_ring::{CursorHandle, ReadBudget, Ring};
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Configuring,
    Active,
    Closed,
}

/// Reads once into `buffer`, retrying on `Interrupted`. `Ok(0)` is EOF.
fn fill<S: Read + ?Sized>(stream: &mut S, buffer: &mut FrameBuffer) -> io::Result<usize> {
    loop {
        match buffer.read_from(stream) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// A freshly accepted stream that has not declared its role yet.
pub struct Handshake<S> {
    stream: S,
    peer: String,
    buffer: FrameBuffer,
    state: ConnectionState,
}

impl<S: Read> Handshake<S> {
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
            buffer: FrameBuffer::new(),
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Blocks until a complete CONFIGURE frame has been read.
    ///
    /// The frame header is checked as soon as it arrives, so a peer that
    /// opens with anything else is refused without reading its body. Bytes
    /// that arrived behind the CONFIGURE frame stay buffered for the active
    /// phase.
    ///
    /// # Errors
    /// Any framing error, a first frame other than CONFIGURE, EOF, or a
    /// socket error. The stream is dropped with the handshake.
    pub fn configure(mut self) -> Result<Configured<S>, ConnectionError> {
        self.state = ConnectionState::Configuring;
        loop {
            if let Some(header) = self.buffer.peek_header()? {
                if header.id != MessageId::Configure {
                    return Err(ConnectionError::ExpectedConfigure(header.id));
                }
                if header.body_len != CONFIGURE_BODY_LEN {
                    return Err(FramingError::BodyLength {
                        message: header.id,
                        expected: CONFIGURE_BODY_LEN,
                        actual: header.body_len,
                    }
                    .into());
                }
            }
            if let Some(message) = self.buffer.next_message()? {
                let Message::Configure(configure) = message else {
                    return Err(ConnectionError::ExpectedConfigure(message.id()));
                };
                debug!(peer = %self.peer, role = %configure.role, "configured");
                return Ok(Configured {
                    stream: self.stream,
                    peer: self.peer,
                    role: configure.role,
                    buffer: self.buffer,
                });
            }
            if fill(&mut self.stream, &mut self.buffer)? == 0 {
                return Err(ConnectionError::Closed);
            }
        }
    }
}

/// A stream whose role is known, waiting to be admitted.
pub struct Configured<S> {
    pub stream: S,
    pub peer: String,
    pub role: Role,
    /// Bytes received after the CONFIGURE frame.
    pub buffer: FrameBuffer,
}

/// An admitted connection bound to one cursor.
pub struct Connection<S> {
    stream: S,
    peer: String,
    role: Role,
    ring: Arc<Ring>,
    cursor: CursorHandle,
    decode: FrameBuffer,
    encode: BytesMut,
    /// Read marks for writer roles, whose cursor tracks what they stored.
    fetched: [u64; 2],
    state: ConnectionState,
    records_in: u64,
    records_out: u64,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(configured: Configured<S>, ring: Arc<Ring>, cursor: CursorHandle) -> Self {
        let position = ring.tracker().position(cursor);
        Self {
            stream: configured.stream,
            peer: configured.peer,
            role: configured.role,
            ring,
            cursor,
            decode: configured.buffer,
            encode: BytesMut::new(),
            fetched: [position; 2],
            state: ConnectionState::Active,
            records_in: 0,
            records_out: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Serves the connection until EOF or the first error.
    ///
    /// A clean EOF returns `Ok(())`. The cursor stays allocated either way.
    pub fn run(&mut self) -> Result<(), ConnectionError> {
        info!(peer = %self.peer, role = %self.role, cursor = self.cursor.index(), "connection active");
        let result = self.serve();
        self.state = ConnectionState::Closed;
        match &result {
            Ok(()) => info!(
                peer = %self.peer,
                role = %self.role,
                records_in = self.records_in,
                records_out = self.records_out,
                "connection closed"
            ),
            Err(error) => warn!(peer = %self.peer, role = %self.role, %error, "connection failed"),
        }
        result
    }

    fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(message) = self.decode.next_message()? {
                self.apply(message)?;
            }
            self.flush()?;
            if fill(&mut self.stream, &mut self.decode)? == 0 {
                if !self.decode.is_empty() {
                    debug!(peer = %self.peer, pending = self.decode.len(), "dropping partial frame at EOF");
                }
                return Ok(());
            }
        }
    }

    /// Applies one decoded message. Replies are buffered until the next flush.
    pub fn apply(&mut self, message: Message) -> Result<(), ConnectionError> {
        match message {
            Message::GetData(request) => {
                self.get_data(request);
                Ok(())
            }
            Message::GiveData(batch) => self.give_data(batch),
            Message::Configure(_) => Err(ConnectionError::UnexpectedConfigure),
        }
    }

    fn get_data(&mut self, request: GetData) {
        let tracker = self.ring.tracker();
        let cursor = tracker.cursor(self.cursor);
        let channel = request.channel;
        let from = match self.role {
            Role::Consumer => cursor.position(),
            Role::Producer | Role::Transformer => self.fetched[channel.index()].max(cursor.position()),
        };

        let batch = self.ring.read(from, cursor.stride(), channel, reply_budget(request.limit));
        let count = batch.records.len() as u64;
        match self.role {
            Role::Consumer => {
                tracker.advance(self.cursor, count);
            }
            Role::Producer | Role::Transformer => self.fetched[channel.index()] = batch.next,
        }
        self.records_out += count;
        debug!(peer = %self.peer, %channel, from, count, "get_data");

        Message::GiveData(GiveData {
            channel,
            records: batch.records,
        })
        .encode(&mut self.encode);
    }

    fn give_data(&mut self, batch: GiveData) -> Result<(), ConnectionError> {
        let channel = batch.channel;
        if self.role.writes() != Some(channel) {
            return Err(ConnectionError::Role {
                role: self.role,
                channel,
            });
        }
        let offered = batch.records.len();
        match self.ring.write(self.cursor, channel, batch.records) {
            Ok(stored) => {
                self.records_in += stored as u64;
                if stored < offered {
                    debug!(peer = %self.peer, %channel, offered, stored, "write boundary reached");
                }
            }
            Err(conflict) => warn!(peer = %self.peer, %conflict, "store aborted"),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConnectionError> {
        if self.encode.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.encode)?;
        self.stream.flush()?;
        self.encode.clear();
        Ok(())
    }
}

/// Read budget for a GET_DATA reply: the request's limit, and never a reply
/// frame longer than the protocol allows.
fn reply_budget(limit: Limit) -> ReadBudget {
    let frame = ReadBudget {
        encoded: MAX_BODY_LEN - GIVE_DATA_FIXED_LEN,
        overhead: RECORD_PREFIX_LEN,
        ..ReadBudget::UNLIMITED
    };
    match limit {
        Limit::Bytes(n) => ReadBudget { bytes: n, ..frame },
        Limit::Elements(n) => ReadBudget { records: n, ..frame },
    }
}

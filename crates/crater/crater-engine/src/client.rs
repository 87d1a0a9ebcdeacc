//! Blocking client used by the `crater-client` binary and the tests.

use bytes::{Bytes, BytesMut};
use crater_protocol::{
    Channel, Configure, FrameBuffer, FramingError, GetData, GiveData, Limit, Message, MessageId,
    Role,
};
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("socket error")]
    Io(#[from] io::Error),

    #[error("bad frame from server")]
    Framing(#[from] FramingError),

    #[error("server closed the connection")]
    Closed,

    #[error("unexpected {0:?} from server")]
    UnexpectedReply(MessageId),
}

pub struct Client {
    stream: TcpStream,
    role: Role,
    decode: FrameBuffer,
    encode: BytesMut,
}

impl Client {
    /// Connects and declares `role`.
    pub fn connect<A: ToSocketAddrs>(addr: A, role: Role) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, role)
    }

    pub fn from_stream(stream: TcpStream, role: Role) -> Result<Self, ClientError> {
        let mut client = Self {
            stream,
            role,
            decode: FrameBuffer::new(),
            encode: BytesMut::new(),
        };
        client.send(&Message::Configure(Configure { role }))?;
        Ok(client)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        self.encode.clear();
        message.encode(&mut self.encode);
        self.stream.write_all(&self.encode)?;
        Ok(())
    }

    /// Blocks until one whole frame arrives.
    pub fn receive(&mut self) -> Result<Message, ClientError> {
        loop {
            if let Some(message) = self.decode.next_message()? {
                return Ok(message);
            }
            match self.decode.read_from(&mut self.stream) {
                Ok(0) => return Err(ClientError::Closed),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sends records. The server does not acknowledge them.
    pub fn give(&mut self, channel: Channel, records: Vec<Bytes>) -> Result<(), ClientError> {
        self.send(&Message::GiveData(GiveData { channel, records }))
    }

    /// Requests records and waits for the reply. An empty reply means
    /// nothing is readable yet.
    pub fn get(&mut self, channel: Channel, limit: Limit) -> Result<Vec<Bytes>, ClientError> {
        self.send(&Message::GetData(GetData { channel, limit }))?;
        match self.receive()? {
            Message::GiveData(reply) if reply.channel == channel => Ok(reply.records),
            other => Err(ClientError::UnexpectedReply(other.id())),
        }
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    pub fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

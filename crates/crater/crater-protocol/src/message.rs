// Wire-level vocabulary shared by every crater process.
// Every enum here is a single byte on the wire; the discriminants are the
// byte values, so `as u8` is the encoding and `TryFrom<u8>` the decoding.

use crate::error::FramingError;
use bytes::Bytes;
use std::fmt;

/// Message identifier, the byte that follows the length prefix.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageId {
    GetData = 0,
    GiveData = 1,
    Configure = 2,
}

impl TryFrom<u8> for MessageId {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::GetData),
            1 => Ok(Self::GiveData),
            2 => Ok(Self::Configure),
            other => Err(FramingError::UnknownMessage(other)),
        }
    }
}

/// Role an actor declares in its CONFIGURE frame.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Appends records to the input channel.
    Producer = 0,
    /// Reads either channel, never writes.
    Consumer = 1,
    /// Reads input, republishes transformed records on the output channel.
    Transformer = 2,
}

impl Role {
    /// The channel this role is allowed to give data on, if any.
    #[inline]
    pub fn writes(self) -> Option<Channel> {
        match self {
            Role::Producer => Some(Channel::Input),
            Role::Transformer => Some(Channel::Output),
            Role::Consumer => None,
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Producer),
            1 => Ok(Self::Consumer),
            2 => Ok(Self::Transformer),
            other => Err(FramingError::UnknownRole(other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::Transformer => "transformer",
        })
    }
}

/// Side of a slot a message targets.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Input = 0,
    Output = 1,
}

impl Channel {
    /// Dense index, handy for per-channel arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Channel {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Input),
            1 => Ok(Self::Output),
            other => Err(FramingError::UnknownChannel(other)),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Input => "input",
            Channel::Output => "output",
        })
    }
}

/// How much a GET_DATA request may return.
///
/// `Bytes` budgets the sum of record payload lengths; `Elements` budgets
/// the number of records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Bytes(u64),
    Elements(u64),
}

impl Limit {
    pub(crate) const KIND_BYTES: u8 = 0;
    pub(crate) const KIND_ELEMENTS: u8 = 1;

    pub(crate) fn from_wire(kind: u8, value: u64) -> Result<Self, FramingError> {
        match kind {
            Self::KIND_BYTES => Ok(Limit::Bytes(value)),
            Self::KIND_ELEMENTS => Ok(Limit::Elements(value)),
            other => Err(FramingError::UnknownLimitKind(other)),
        }
    }

    pub(crate) fn kind(self) -> u8 {
        match self {
            Limit::Bytes(_) => Self::KIND_BYTES,
            Limit::Elements(_) => Self::KIND_ELEMENTS,
        }
    }

    pub(crate) fn value(self) -> u64 {
        match self {
            Limit::Bytes(v) | Limit::Elements(v) => v,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configure {
    pub role: Role,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GetData {
    pub channel: Channel,
    pub limit: Limit,
}

/// A batch of opaque records for one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GiveData {
    pub channel: Channel,
    pub records: Vec<Bytes>,
}

/// One decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Configure(Configure),
    GetData(GetData),
    GiveData(GiveData),
}

impl Message {
    pub fn id(&self) -> MessageId {
        match self {
            Message::Configure(_) => MessageId::Configure,
            Message::GetData(_) => MessageId::GetData,
            Message::GiveData(_) => MessageId::GiveData,
        }
    }
}

impl From<Configure> for Message {
    fn from(m: Configure) -> Self {
        Message::Configure(m)
    }
}

impl From<GetData> for Message {
    fn from(m: GetData) -> Self {
        Message::GetData(m)
    }
}

impl From<GiveData> for Message {
    fn from(m: GiveData) -> Self {
        Message::GiveData(m)
    }
}

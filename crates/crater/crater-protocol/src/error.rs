use crate::message::MessageId;

/// A frame that can never become valid no matter how many more bytes arrive.
///
/// Every variant is fatal to the connection that sent it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("frame body of {len} bytes exceeds the {max} byte maximum")]
    Oversized { len: u64, max: u64 },

    #[error("unknown message id {0:#04x}")]
    UnknownMessage(u8),

    #[error("unknown actor role {0:#04x}")]
    UnknownRole(u8),

    #[error("unknown channel {0:#04x}")]
    UnknownChannel(u8),

    #[error("unknown limit kind {0:#04x}")]
    UnknownLimitKind(u8),

    #[error("{message:?} body is {actual} bytes, expected {expected}")]
    BodyLength {
        message: MessageId,
        expected: u64,
        actual: u64,
    },

    #[error("record {index} needs {needed} bytes but only {remaining} remain in the frame")]
    RecordOverrun {
        index: u64,
        needed: u64,
        remaining: u64,
    },

    #[error("GIVE_DATA frame carries {0} bytes after its last record")]
    TrailingBytes(u64),
}

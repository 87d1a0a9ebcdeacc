use crater_protocol::{Channel, FramingError, MessageId, Role};
use std::io;

/// Why a connection stopped serving.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("socket error")]
    Io(#[from] io::Error),

    #[error("bad frame")]
    Framing(#[from] FramingError),

    #[error("{role} may not give data on the {channel} channel")]
    Role { role: Role, channel: Channel },

    #[error("expected CONFIGURE, got {0:?}")]
    ExpectedConfigure(MessageId),

    #[error("CONFIGURE may only be sent once")]
    UnexpectedConfigure,

    #[error("peer closed the connection")]
    Closed,
}

/// Why the coordinator refused a configured connection.
#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    #[error("a {0} is already connected")]
    RoleConflict(Role),

    #[error("no {0} slot left in the roster")]
    Full(Role),

    #[error("the roster is no longer assembling")]
    NotAssembling,

    #[error("cursor arena exhausted")]
    Exhausted,

    #[error("failed to bind the connection")]
    Io(#[source] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("roster is not complete")]
    NotReady,

    #[error("session already started")]
    AlreadyStarted,

    #[error("failed to spawn the {role} worker")]
    Spawn {
        role: Role,
        #[source]
        source: io::Error,
    },
}

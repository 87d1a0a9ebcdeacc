mod acceptor;
mod client;
mod connection;
mod error;
mod session;

pub use acceptor::Acceptor;
pub use client::{Client, ClientError};
pub use connection::{Configured, Connection, ConnectionState, Handshake};
pub use error::{AdmitError, ConnectionError, SessionError};
pub use session::{Roster, RosterPlan, Session, SessionState};

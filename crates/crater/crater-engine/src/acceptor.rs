use crate::connection::Handshake;
use crate::session::{Session, SessionState};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use tracing::{info, warn};

/// Accepts actors until a session's roster is complete.
pub struct Acceptor {
    listener: TcpListener,
}

impl Acceptor {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        Ok(Self::from_listener(TcpListener::bind(addr)?))
    }

    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts, configures and admits connections one at a time until the
    /// session leaves `Assembling`, then closes the listener.
    ///
    /// A connection that fails its handshake or is refused by the session is
    /// closed and does not change the roster. Once the listener is closed,
    /// later connection attempts are refused by the OS.
    ///
    /// # Errors
    /// Only a listener failure that is not tied to a single peer.
    pub fn assemble(self, session: &mut Session) -> io::Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "waiting for actors");
        while session.state() == SessionState::Assembling {
            let (stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if transient(&e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %addr, error = %e, "set_nodelay failed");
            }

            let configured = match Handshake::new(stream, addr.to_string()).configure() {
                Ok(configured) => configured,
                Err(e) => {
                    warn!(peer = %addr, error = %e, "handshake failed");
                    continue;
                }
            };
            let role = configured.role;
            if let Err(e) = session.admit(configured) {
                warn!(peer = %addr, %role, error = %e, "refused");
            }
        }
        info!("roster complete, listener closed");
        Ok(())
    }
}

fn transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::WouldBlock
    )
}

use crate::connection::{Configured, Connection};
use crate::error::{AdmitError, ConnectionError, SessionError};
use crater_config::RosterSection;
use crater_protocol::{Channel, Role};
use crater_ring::{AllocError, CursorHandle, Ring, RingConfig};
use std::collections::BTreeMap;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting actors until the roster is complete.
    Assembling,
    /// Roster complete. Admission is closed.
    Running,
    Stopped,
}

/// Which actors the session waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RosterPlan {
    pub producer: bool,
    pub transformer: bool,
    pub consumers: usize,
    pub consumer_stride: u64,
}

impl Default for RosterPlan {
    fn default() -> Self {
        Self {
            producer: true,
            transformer: true,
            consumers: 0,
            consumer_stride: 1,
        }
    }
}

impl From<&RosterSection> for RosterPlan {
    fn from(section: &RosterSection) -> Self {
        Self {
            producer: section.producer,
            transformer: section.transformer,
            consumers: section.consumers,
            consumer_stride: section.consumer_stride,
        }
    }
}

/// Actors admitted so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    pub producer: bool,
    pub transformer: bool,
    pub consumers: usize,
}

impl Roster {
    pub fn satisfies(&self, plan: &RosterPlan) -> bool {
        self.producer == plan.producer
            && self.transformer == plan.transformer
            && self.consumers == plan.consumers
    }

    fn record(&mut self, role: Role) {
        match role {
            Role::Producer => self.producer = true,
            Role::Transformer => self.transformer = true,
            Role::Consumer => self.consumers += 1,
        }
    }
}

struct Binding {
    role: Role,
    peer: String,
    /// Second handle on the socket, used to unblock the worker on stop.
    closer: TcpStream,
    pending: Option<Configured<TcpStream>>,
    worker: Option<JoinHandle<Result<(), ConnectionError>>>,
}

/// Owns the ring and every admitted connection.
///
/// Connections are admitted one at a time while assembling. Once the roster
/// is complete the ring is shared with one worker thread per connection.
pub struct Session {
    ring: Arc<Ring>,
    plan: RosterPlan,
    roster: Roster,
    state: SessionState,
    bindings: BTreeMap<CursorHandle, Binding>,
}

impl Session {
    pub fn new(config: RingConfig, plan: RosterPlan) -> Self {
        let roster = Roster::default();
        let state = if roster.satisfies(&plan) {
            SessionState::Running
        } else {
            SessionState::Assembling
        };
        Self {
            ring: Arc::new(Ring::new(config)),
            plan,
            roster,
            state,
            bindings: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> &RosterPlan {
        &self.plan
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn is_ready(&self) -> bool {
        self.roster.satisfies(&self.plan)
    }

    /// Admits a configured connection and binds it to a new cursor.
    ///
    /// Either the cursor is allocated and the connection registered, or
    /// nothing changes.
    ///
    /// # Errors
    /// The session is not assembling, the role is already taken or not
    /// expected, or the socket cannot be bound.
    pub fn admit(&mut self, connection: Configured<TcpStream>) -> Result<CursorHandle, AdmitError> {
        if self.state != SessionState::Assembling {
            return Err(AdmitError::NotAssembling);
        }
        let role = connection.role;
        let (wanted, present) = match role {
            Role::Producer => (self.plan.producer, self.roster.producer),
            Role::Transformer => (self.plan.transformer, self.roster.transformer),
            Role::Consumer => (self.roster.consumers < self.plan.consumers, false),
        };
        if present {
            return Err(AdmitError::RoleConflict(role));
        }
        if !wanted {
            return Err(AdmitError::Full(role));
        }

        let ring = Arc::get_mut(&mut self.ring).ok_or(AdmitError::NotAssembling)?;
        let reservation = ring
            .tracker_mut()
            .reserve_with_stride(role, self.plan.consumer_stride)
            .map_err(|e| match e {
                AllocError::RoleTaken(role) => AdmitError::RoleConflict(role),
                AllocError::Exhausted => AdmitError::Exhausted,
            })?;
        // Dropping the reservation on error releases the cursor.
        let closer = connection.stream.try_clone().map_err(AdmitError::Io)?;
        let handle = reservation.commit();

        info!(peer = %connection.peer, %role, cursor = handle.index(), "admitted");
        self.roster.record(role);
        self.bindings.insert(
            handle,
            Binding {
                role,
                peer: connection.peer.clone(),
                closer,
                pending: Some(connection),
                worker: None,
            },
        );

        if self.is_ready() {
            self.state = SessionState::Running;
            info!(connections = self.bindings.len(), "roster complete");
        }
        Ok(handle)
    }

    /// Starts one worker thread per admitted connection.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Assembling => return Err(SessionError::NotReady),
            SessionState::Stopped => return Err(SessionError::AlreadyStarted),
            SessionState::Running => {}
        }
        if self.bindings.values().any(|b| b.worker.is_some()) {
            return Err(SessionError::AlreadyStarted);
        }

        for (&handle, binding) in &mut self.bindings {
            let Some(configured) = binding.pending.take() else {
                continue;
            };
            let role = binding.role;
            let peer = binding.peer.clone();
            let mut connection = Connection::new(configured, Arc::clone(&self.ring), handle);
            let worker = thread::Builder::new()
                .name(format!("crater-{role}-{}", handle.index()))
                .spawn(move || {
                    let result = connection.run();
                    // The session holds a clone of the socket; close it for the peer now.
                    if let Err(e) = connection.stream().shutdown(Shutdown::Both) {
                        debug!(%peer, error = %e, "shutdown");
                    }
                    result
                })
                .map_err(|source| SessionError::Spawn { role, source })?;
            binding.worker = Some(worker);
        }
        info!(workers = self.bindings.len(), capacity = self.ring.capacity(), "session started");
        Ok(())
    }

    /// Workers that have not returned yet.
    pub fn live_workers(&self) -> usize {
        self.bindings
            .values()
            .filter(|b| b.worker.as_ref().is_some_and(|w| !w.is_finished()))
            .count()
    }

    /// Logs ring progress every `interval` until `stop` is set or every
    /// worker has returned.
    pub fn monitor(&self, interval: Duration, stop: &AtomicBool) {
        while !stop.load(Ordering::Acquire) {
            let live = self.live_workers();
            if live == 0 {
                info!("all connections closed");
                return;
            }
            let tracker = self.ring.tracker();
            for (handle, role, position) in tracker.snapshot() {
                debug!(cursor = handle.index(), %role, position, "cursor");
            }
            info!(
                live,
                input_watermark = tracker.input_watermark(),
                output_watermark = tracker.output_watermark(),
                input_held = self.ring.store().occupied(Channel::Input),
                output_held = self.ring.store().occupied(Channel::Output),
                "ring status"
            );
            thread::sleep(interval);
        }
    }

    /// Closes every socket and joins every worker. Cursors stay allocated.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        for binding in self.bindings.values_mut() {
            if let Err(e) = binding.closer.shutdown(Shutdown::Both) {
                debug!(peer = %binding.peer, error = %e, "shutdown");
            }
            binding.pending = None;
            let Some(worker) = binding.worker.take() else {
                continue;
            };
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(peer = %binding.peer, error = %e, "worker ended with error"),
                Err(_) => error!(peer = %binding.peer, role = %binding.role, "worker panicked"),
            }
        }
        self.state = SessionState::Stopped;
        info!("session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped && !self.bindings.is_empty() {
            warn!("session dropped without stop");
        }
        self.stop();
    }
}

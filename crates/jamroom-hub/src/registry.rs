//! Live session set.
//!
//! A [`SessionHandle`] is the hub's view of one connected client: its
//! identity, display name, and the outbound channel the WebSocket write
//! task drains. Delivery is always non-blocking `try_send` so that a
//! stalled peer can never stall a broadcast.
//!
//! The [`Registry`] itself is a plain insertion-ordered collection. It
//! carries no lock of its own: all mutation goes through the engine's
//! single mutex, which is what makes "append happens-before snapshot"
//! hold across the backlog and the membership set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use jamroom_core::errors::HubError;
use jamroom_core::ids::SessionId;

/// One connected client, as seen by the hub.
pub struct SessionHandle {
    /// Opaque connection identity, unique for the connection's lifetime.
    pub id: SessionId,
    /// Client-chosen display name. Not unique.
    pub display_name: String,
    /// Outbound channel into the session's write task.
    sender: mpsc::Sender<Arc<str>>,
    /// Claimed by the first teardown path to announce this departure.
    departed: AtomicBool,
    /// Cancelled when the hub tears this session down; the connection task
    /// observes it and ends.
    closed: CancellationToken,
}

impl SessionHandle {
    /// Create a handle with a freshly minted [`SessionId`].
    #[must_use]
    pub fn new(display_name: impl Into<String>, sender: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: SessionId::new(),
            display_name: display_name.into(),
            sender,
            departed: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a message for this session without blocking.
    ///
    /// Returns `false` when the channel is full or closed — both count as a
    /// transport failure and trigger this session's teardown.
    pub fn send(&self, message: Arc<str>) -> bool {
        self.sender.try_send(message).is_ok()
    }

    /// Claim the right to announce this session's departure.
    ///
    /// Racing teardown paths (the session's own close, a failed delivery
    /// during someone else's publish) both call this; exactly one wins.
    pub fn claim_departure(&self) -> bool {
        !self.departed.swap(true, Ordering::SeqCst)
    }

    /// Token cancelled when this session is torn down. The connection task
    /// selects on it so a reaped session's socket does not outlive its
    /// registration.
    #[must_use]
    pub fn transport_closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Signal the connection task to end. Idempotent.
    pub fn close_transport(&self) {
        self.closed.cancel();
    }
}

/// Insertion-ordered set of live sessions, keyed by [`SessionId`].
#[derive(Default)]
pub struct Registry {
    sessions: Vec<Arc<SessionHandle>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session.
    ///
    /// Fails with [`HubError::DuplicateSession`] when the ID is already
    /// present, leaving membership unchanged. Identity is the session ID,
    /// never the display name or the channel handle.
    pub fn add(&mut self, session: Arc<SessionHandle>) -> Result<(), HubError> {
        if self.contains(session.id) {
            return Err(HubError::DuplicateSession(session.id));
        }
        self.sessions.push(session);
        Ok(())
    }

    /// Remove a session by ID. Idempotent: removing an absent ID is a
    /// no-op, which lets racing disconnect and error paths both call it.
    pub fn remove(&mut self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let idx = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(idx))
    }

    /// Point-in-time ordered copy of the membership, used for fan-out so
    /// iteration is never corrupted by concurrent add/remove.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.clone()
    }

    /// Whether a session with this ID is registered.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

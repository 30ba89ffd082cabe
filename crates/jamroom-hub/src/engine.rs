//! Message fan-out and replay-then-register joins.
//!
//! [`Hub`] owns the registry and the backlog behind one mutex. That single
//! exclusive-access discipline is load-bearing: a persisted message is
//! appended to the backlog before the fan-out snapshot is taken, and a
//! joining session replays the backlog and registers inside one critical
//! section — so a newcomer can neither miss a message published around its
//! join nor see one twice.
//!
//! Delivery is non-blocking (`try_send` into each session's outbound
//! channel), so no await point is ever held across the lock and one
//! stalled peer cannot stall a broadcast. A failed delivery removes that
//! session from the registry in the same critical section and hands its
//! handle back to the caller for departure announcement; it never aborts
//! delivery to the remaining sessions and is never retried.

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use jamroom_core::errors::HubError;
use jamroom_core::ids::SessionId;

use crate::backlog::Backlog;
use crate::registry::{Registry, SessionHandle};

/// Construction-time hub knobs.
#[derive(Clone, Debug, Default)]
pub struct HubOptions {
    /// Explicit backlog bound. `None` retains everything (the default),
    /// `Some(n)` drops oldest-first.
    pub backlog_cap: Option<usize>,
}

struct HubInner {
    registry: Registry,
    backlog: Backlog,
}

/// The broadcast engine: live membership plus message history.
pub struct Hub {
    inner: Mutex<HubInner>,
}

impl Hub {
    /// Create a hub with the given options.
    #[must_use]
    pub fn new(options: &HubOptions) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                registry: Registry::new(),
                backlog: Backlog::new(options.backlog_cap),
            }),
        }
    }

    /// Publish a JSON payload. See [`Hub::publish_text`].
    pub fn publish(
        &self,
        payload: &Value,
        persist: bool,
        skip: Option<SessionId>,
    ) -> Vec<Arc<SessionHandle>> {
        self.publish_text(&payload.to_string(), persist, skip)
    }

    /// Publish a wire-ready message to every registered session.
    ///
    /// If `persist`, the message is appended to the backlog before the
    /// membership snapshot is taken. `skip` excludes one session (used for
    /// "notify others" announcements). Returns the handles whose delivery
    /// failed — already deregistered, awaiting departure announcement by
    /// the caller.
    pub fn publish_text(
        &self,
        message: &str,
        persist: bool,
        skip: Option<SessionId>,
    ) -> Vec<Arc<SessionHandle>> {
        let message: Arc<str> = Arc::from(message);
        let mut failed = Vec::new();
        let mut recipients = 0u32;
        {
            let mut inner = self.inner.lock();
            if persist {
                inner.backlog.push(Arc::clone(&message));
            }
            for session in inner.registry.snapshot() {
                if skip == Some(session.id) {
                    continue;
                }
                recipients += 1;
                if !session.send(Arc::clone(&message)) {
                    counter!("hub_broadcast_drops_total").increment(1);
                    let _ = inner.registry.remove(session.id);
                    failed.push(session);
                }
            }
        }
        counter!("hub_messages_published_total").increment(1);
        debug!(recipients, persist, failed = failed.len(), "published message");
        failed
    }

    /// Replay the backlog to a new session, then register it — one lock
    /// spans both steps, so nothing published in between can be missed or
    /// duplicated.
    ///
    /// Fails with [`HubError::DuplicateSession`] if the ID is already
    /// registered (nothing is sent in that case, the duplicate check runs
    /// first) and with [`HubError::Transport`] if the newcomer's channel
    /// cannot absorb the replay. Returns the number of replayed messages.
    pub fn join(&self, handle: Arc<SessionHandle>) -> Result<usize, HubError> {
        let mut inner = self.inner.lock();
        if inner.registry.contains(handle.id) {
            return Err(HubError::DuplicateSession(handle.id));
        }
        let mut replayed = 0usize;
        for message in inner.backlog.iter() {
            if !handle.send(Arc::clone(message)) {
                return Err(HubError::transport(
                    "outbound channel rejected backlog replay",
                ));
            }
            replayed += 1;
        }
        inner.registry.add(handle)?;
        counter!("hub_backlog_replayed_total").increment(replayed as u64);
        Ok(replayed)
    }

    /// Deregister a session. Idempotent; returns the handle if it was
    /// still registered.
    pub fn leave(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.lock().registry.remove(id)
    }

    /// Number of currently registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    /// Number of messages retained in the backlog.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.inner.lock().backlog.len()
    }
}

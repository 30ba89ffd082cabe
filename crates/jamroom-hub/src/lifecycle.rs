//! Per-session protocol driver.
//!
//! Each connection is driven through `Connecting → Active → Closing →
//! Closed`. [`SessionCoordinator::connect`] performs the join handshake
//! (duplicate check, backlog replay, welcome, join announcement); the
//! receive loop in [`SessionCoordinator::run`] decodes inbound frames and
//! publishes them; [`SessionCoordinator::close`] deregisters and announces
//! the departure with cause-specific text. `Closed` is terminal — a
//! coordinator is consumed by `close` and a session is never reactivated.
//!
//! Failures stay inside the session they belong to: a decode error skips
//! one frame, a transport error tears down one session, and handles that
//! fail delivery during someone else's publish are reaped here with
//! announce-once semantics.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use metrics::counter;
use tracing::{info, warn};

use jamroom_core::errors::HubError;
use jamroom_core::frames::{self, Frame};

use crate::engine::Hub;
use crate::registry::SessionHandle;

/// Why a session left `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseCause {
    /// The client closed the connection normally.
    ClientClosed,
    /// Sending to or receiving from the client's transport failed.
    TransportError,
    /// The server asked the session to terminate (shutdown).
    ForcedShutdown,
}

impl CloseCause {
    /// Departure announcement text broadcast to the surviving sessions.
    #[must_use]
    pub fn departure_text(self, display_name: &str) -> String {
        match self {
            Self::ClientClosed => format!("{display_name} left the room!"),
            Self::TransportError => {
                format!("{display_name} left the room due to a connection error!")
            }
            Self::ForcedShutdown => {
                format!("{display_name} was disconnected: server is shutting down.")
            }
        }
    }
}

/// Per-session behavior knobs, derived from hub configuration.
#[derive(Clone, Debug)]
pub struct SessionPolicy {
    /// Whether the joiner receives its own join announcement.
    pub echo_join_to_self: bool,
    /// Whether non-JSON frames pass through verbatim instead of being
    /// rejected as decode errors.
    pub accept_raw_text: bool,
    /// Frame types broadcast live but excluded from the backlog.
    pub live_only_types: Vec<String>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            echo_join_to_self: false,
            accept_raw_text: false,
            live_only_types: vec![frames::TYPE_PAUSE.to_owned()],
        }
    }
}

/// Drives one session from accept to teardown.
pub struct SessionCoordinator {
    hub: Arc<Hub>,
    handle: Arc<SessionHandle>,
    policy: SessionPolicy,
}

impl SessionCoordinator {
    /// `Connecting → Active`: join the hub (backlog replay + registration
    /// under one lock), send the welcome frame directly to the newcomer,
    /// and broadcast the ephemeral join announcement.
    ///
    /// On a duplicate session ID the connection is rejected before
    /// anything is sent to it and no announcement is made.
    pub fn connect(
        hub: Arc<Hub>,
        handle: Arc<SessionHandle>,
        policy: SessionPolicy,
    ) -> Result<Self, HubError> {
        let replayed = match hub.join(Arc::clone(&handle)) {
            Ok(n) => n,
            Err(e) => {
                warn!(session_id = %handle.id, name = %handle.display_name, error = %e, "join rejected");
                return Err(e);
            }
        };
        info!(
            session_id = %handle.id,
            name = %handle.display_name,
            replayed,
            "session active"
        );

        let welcome = frames::welcome(&handle.display_name).to_string();
        if !handle.send(Arc::from(welcome.as_str())) {
            let _ = hub.leave(handle.id);
            return Err(HubError::transport("welcome delivery failed"));
        }

        let skip = if policy.echo_join_to_self {
            None
        } else {
            Some(handle.id)
        };
        let announcement =
            frames::notification(format!("{} joined the room!", handle.display_name));
        let failed = hub.publish(&announcement, false, skip);
        reap_failed(&hub, failed);

        Ok(Self {
            hub,
            handle,
            policy,
        })
    }

    /// This session's handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Decode one inbound frame and publish it.
    ///
    /// Frames whose type is in `live_only_types` are broadcast without
    /// backlog persistence. A decode failure is returned to the caller —
    /// the session stays active.
    pub fn handle_frame(&self, raw: &str) -> Result<(), HubError> {
        let frame = Frame::decode(raw, self.policy.accept_raw_text)?;
        let persist = frame
            .kind()
            .is_none_or(|kind| !self.policy.live_only_types.iter().any(|t| t == kind));
        let failed = self.hub.publish_text(&frame.encode(), persist, None);
        reap_failed(&self.hub, failed);
        Ok(())
    }

    /// `Active`: consume transport frames until the stream ends (client
    /// close) or yields a transport error. Decode failures are logged and
    /// skipped. Returns the close cause; the caller then invokes
    /// [`SessionCoordinator::close`].
    pub async fn run<S>(&self, mut frames: S) -> CloseCause
    where
        S: Stream<Item = Result<String, HubError>> + Unpin,
    {
        while let Some(item) = frames.next().await {
            match item {
                Ok(text) => {
                    if let Err(e) = self.handle_frame(&text) {
                        counter!("hub_decode_errors_total").increment(1);
                        warn!(session_id = %self.handle.id, error = %e, "skipping undecodable frame");
                    }
                }
                Err(HubError::ForcedShutdown) => return CloseCause::ForcedShutdown,
                Err(e) => {
                    warn!(session_id = %self.handle.id, error = %e, "transport failure");
                    return CloseCause::TransportError;
                }
            }
        }
        CloseCause::ClientClosed
    }

    /// `Closing → Closed`: deregister (idempotent), claim the departure
    /// flag, and broadcast the cause-specific departure announcement.
    /// Consumes the coordinator — `Closed` is final.
    pub fn close(self, cause: CloseCause) {
        let _ = self.hub.leave(self.handle.id);
        if self.handle.claim_departure() {
            let text = cause.departure_text(&self.handle.display_name);
            let failed = self.hub.publish(&frames::notification(text), false, None);
            reap_failed(&self.hub, failed);
        }
        info!(
            session_id = %self.handle.id,
            name = %self.handle.display_name,
            ?cause,
            "session closed"
        );
    }
}

/// Tear down sessions whose delivery failed during a publish.
///
/// The engine has already deregistered them; here each one's transport is
/// signalled closed (so a slow-but-alive client cannot keep publishing
/// into a room it no longer belongs to) and the departure is announced for
/// each handle whose flag we win. Announcing can itself surface more dead
/// sessions, so this loops until the fan-out is clean — each iteration
/// removes a session, so it terminates.
pub fn reap_failed(hub: &Hub, failed: Vec<Arc<SessionHandle>>) {
    let mut pending = failed;
    while let Some(handle) = pending.pop() {
        handle.close_transport();
        if !handle.claim_departure() {
            continue;
        }
        warn!(session_id = %handle.id, name = %handle.display_name, "dropping unresponsive session");
        let text = CloseCause::TransportError.departure_text(&handle.display_name);
        let more = hub.publish(&frames::notification(text), false, None);
        pending.extend(more);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HubOptions;
    use futures::stream;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn make_session(name: &str) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(64);
        (Arc::new(SessionHandle::new(name, tx)), rx)
    }

    fn drain_json(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(serde_json::from_str(&m).unwrap());
        }
        out
    }

    fn connect(
        hub: &Arc<Hub>,
        name: &str,
        policy: SessionPolicy,
    ) -> (SessionCoordinator, mpsc::Receiver<Arc<str>>) {
        let (handle, rx) = make_session(name);
        let coordinator =
            SessionCoordinator::connect(Arc::clone(hub), handle, policy).unwrap();
        (coordinator, rx)
    }

    #[test]
    fn join_with_empty_backlog_gets_welcome_only() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (_x, mut rx) = connect(&hub, "ada", SessionPolicy::default());
        let got = drain_json(&mut rx);
        assert_eq!(got.len(), 1, "zero replay messages, one welcome");
        assert_eq!(got[0]["type"], "welcome");
    }

    #[test]
    fn join_announcement_goes_to_others_not_self_by_default() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (_a, mut rxa) = connect(&hub, "ada", SessionPolicy::default());
        let _ = drain_json(&mut rxa);

        let (_b, mut rxb) = connect(&hub, "brian", SessionPolicy::default());
        let to_a = drain_json(&mut rxa);
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_a[0]["type"], "notification");
        assert!(to_a[0]["message"].as_str().unwrap().contains("brian joined"));

        let to_b = drain_json(&mut rxb);
        assert_eq!(to_b.len(), 1, "joiner sees welcome only");
        assert_eq!(to_b[0]["type"], "welcome");
    }

    #[test]
    fn join_announcement_echoes_to_self_when_configured() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let policy = SessionPolicy {
            echo_join_to_self: true,
            ..SessionPolicy::default()
        };
        let (_a, mut rxa) = connect(&hub, "ada", policy);
        let got = drain_json(&mut rxa);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0]["type"], "welcome");
        assert_eq!(got[1]["type"], "notification");
        assert!(got[1]["message"].as_str().unwrap().contains("ada joined"));
    }

    #[test]
    fn duplicate_session_is_rejected_silently() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (handle, mut rx) = make_session("ada");
        let first =
            SessionCoordinator::connect(Arc::clone(&hub), Arc::clone(&handle), SessionPolicy::default())
                .unwrap();
        let _ = drain_json(&mut rx);

        let Err(err) =
            SessionCoordinator::connect(Arc::clone(&hub), handle, SessionPolicy::default())
        else {
            panic!("second connect with the same handle must be rejected");
        };
        assert!(matches!(err, HubError::DuplicateSession(_)));
        assert_eq!(hub.session_count(), 1);
        assert!(
            drain_json(&mut rx).is_empty(),
            "rejected connection never triggers a send"
        );
        drop(first);
    }

    #[test]
    fn persisted_frame_lands_in_backlog_and_replay() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, mut rxx) = connect(&hub, "x", SessionPolicy::default());
        let _ = drain_json(&mut rxx);

        x.handle_frame(r#"{"type":"play","track":"t1"}"#).unwrap();
        assert_eq!(hub.backlog_len(), 1);

        let (_y, mut rxy) = connect(&hub, "y", SessionPolicy::default());
        let got = drain_json(&mut rxy);
        // Replay strictly precedes the welcome, which is sent after join.
        assert_eq!(got[0]["track"], "t1");
        assert_eq!(got[1]["type"], "welcome");
    }

    #[test]
    fn pause_is_broadcast_live_but_never_replayed() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, mut rxx) = connect(&hub, "x", SessionPolicy::default());
        let (_o, mut rxo) = connect(&hub, "other", SessionPolicy::default());
        let _ = drain_json(&mut rxx);
        let _ = drain_json(&mut rxo);

        x.handle_frame(r#"{"type":"pause"}"#).unwrap();
        assert_eq!(hub.backlog_len(), 0);
        let live = drain_json(&mut rxo);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0]["type"], "pause");

        let (_z, mut rxz) = connect(&hub, "z", SessionPolicy::default());
        let got = drain_json(&mut rxz);
        assert_eq!(got.len(), 1, "replay is empty for z");
        assert_eq!(got[0]["type"], "welcome");
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_and_session_continues() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let (_o, mut rxo) = connect(&hub, "other", SessionPolicy::default());
        let _ = drain_json(&mut rxo);

        let frames = stream::iter(vec![
            Ok::<_, HubError>("{broken json".to_owned()),
            Ok(r#"{"type":"play","track":"t2"}"#.to_owned()),
        ]);
        let cause = x.run(frames).await;
        assert_eq!(cause, CloseCause::ClientClosed);

        let got = drain_json(&mut rxo);
        assert_eq!(got.len(), 1, "malformed frame produced no broadcast");
        assert_eq!(got[0]["track"], "t2");
    }

    #[tokio::test]
    async fn transport_error_classifies_the_close() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let frames = stream::iter(vec![Err::<String, _>(HubError::transport("reset by peer"))]);
        assert_eq!(x.run(frames).await, CloseCause::TransportError);
    }

    #[tokio::test]
    async fn end_of_stream_is_a_client_close() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let frames = stream::iter(Vec::<Result<String, HubError>>::new());
        assert_eq!(x.run(frames).await, CloseCause::ClientClosed);
    }

    #[test]
    fn close_deregisters_and_announces_with_cause_text() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let (_o, mut rxo) = connect(&hub, "other", SessionPolicy::default());
        let _ = drain_json(&mut rxo);

        x.close(CloseCause::ClientClosed);
        assert_eq!(hub.session_count(), 1);
        let got = drain_json(&mut rxo);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["message"], "x left the room!");
    }

    #[test]
    fn forced_shutdown_has_distinct_departure_text() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let (_o, mut rxo) = connect(&hub, "other", SessionPolicy::default());
        let _ = drain_json(&mut rxo);

        x.close(CloseCause::ForcedShutdown);
        let got = drain_json(&mut rxo);
        assert!(
            got[0]["message"]
                .as_str()
                .unwrap()
                .contains("server is shutting down")
        );
    }

    #[test]
    fn dead_session_is_reaped_once_with_transport_text() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let (dead, mut rx_dead) = connect(&hub, "dead", SessionPolicy::default());
        let (_o, mut rxo) = connect(&hub, "other", SessionPolicy::default());
        let _ = drain_json(&mut rxo);
        // Kill dead's transport, then publish through x.
        rx_dead.close();
        x.handle_frame(r#"{"type":"play","track":"t3"}"#).unwrap();

        assert_eq!(hub.session_count(), 2);
        let got = drain_json(&mut rxo);
        assert_eq!(got.len(), 2, "the message plus one departure");
        assert_eq!(got[0]["track"], "t3");
        assert_eq!(
            got[1]["message"],
            "dead left the room due to a connection error!"
        );

        // The dead session's own close path loses the departure claim.
        dead.close(CloseCause::ClientClosed);
        assert!(drain_json(&mut rxo).is_empty(), "no second announcement");
    }

    #[test]
    fn reaped_session_transport_is_signalled_closed() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        let (slow, mut rx_slow) = connect(&hub, "slow", SessionPolicy::default());
        let _ = drain_json(&mut rx_slow);
        // Simulate a wedged transport, then publish through x to trip the
        // failed-delivery path.
        rx_slow.close();
        x.handle_frame(r#"{"type":"play","track":"t9"}"#).unwrap();

        assert_eq!(hub.session_count(), 1);
        assert!(
            slow.handle().transport_closed().is_cancelled(),
            "reaped session's connection task must be told to end"
        );
        assert!(
            !x.handle().transport_closed().is_cancelled(),
            "surviving session is untouched"
        );
    }

    #[test]
    fn raw_text_policy_broadcasts_non_json_verbatim() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let policy = SessionPolicy {
            accept_raw_text: true,
            ..SessionPolicy::default()
        };
        let (x, _rxx) = connect(&hub, "x", policy.clone());
        let (_o, mut rxo) = connect(&hub, "other", policy);
        while rxo.try_recv().is_ok() {}

        x.handle_frame("now playing: side B").unwrap();
        let raw = rxo.try_recv().unwrap();
        assert_eq!(&*raw, "now playing: side B");
        assert_eq!(hub.backlog_len(), 1, "raw text is persisted");
    }

    #[test]
    fn departure_texts_cover_every_cause() {
        assert_eq!(
            CloseCause::ClientClosed.departure_text("ada"),
            "ada left the room!"
        );
        assert!(
            CloseCause::TransportError
                .departure_text("ada")
                .contains("connection error")
        );
        assert!(
            CloseCause::ForcedShutdown
                .departure_text("ada")
                .contains("shutting down")
        );
    }

    #[test]
    fn unknown_types_are_opaque_and_persisted() {
        let hub = Arc::new(Hub::new(&HubOptions::default()));
        let (x, _rxx) = connect(&hub, "x", SessionPolicy::default());
        x.handle_frame(r#"{"type":"vibe_check","level":11}"#).unwrap();
        assert_eq!(hub.backlog_len(), 1);
    }
}

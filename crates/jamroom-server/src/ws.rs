//! Per-connection WebSocket plumbing.
//!
//! Each accepted socket gets two tasks: this function's read loop (the
//! coordinator's frame stream) and a spawned write loop draining the
//! session's outbound channel into the socket sink. The write loop owns
//! the sink and closes it exactly once — when the channel ends, whichever
//! path (client close, transport error, forced shutdown, reaping) dropped
//! the last sender.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use jamroom_core::errors::HubError;
use jamroom_hub::{CloseCause, SessionCoordinator, SessionHandle};

use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_REJECTED_TOTAL,
};
use crate::state::AppState;

/// Drive one upgraded socket from accept to teardown.
pub async fn serve_connection(state: AppState, socket: WebSocket, username: String) {
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let (outbound_tx, outbound_rx) = mpsc::channel(state.settings.room.outbound_buffer);
    let handle = Arc::new(SessionHandle::new(username, outbound_tx));
    let session_id = handle.id;

    let coordinator = match SessionCoordinator::connect(
        Arc::clone(&state.hub),
        handle,
        state.settings.room.policy(),
    ) {
        Ok(c) => c,
        Err(e) => {
            counter!(WS_REJECTED_TOTAL).increment(1);
            warn!(session_id = %session_id, error = %e, "connection rejected");
            // Dropping the socket closes it; the rejected client was never
            // sent anything.
            drop(socket);
            return;
        }
    };
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound_rx));

    let frames = stream
        .filter_map(|item| async move {
            match item {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        warn!("skipping non-utf8 binary frame");
                        None
                    }
                },
                // Pings and pongs are handled by axum; a close frame ends
                // the stream right after.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
                Err(e) => Some(Err(HubError::transport(e))),
            }
        })
        .boxed();

    let transport_closed = coordinator.handle().transport_closed().clone();
    let cause = tokio::select! {
        cause = coordinator.run(frames) => cause,
        // The hub reaped this session (failed delivery); stop reading
        // before the client can publish into a room it has left.
        () = transport_closed.cancelled() => CloseCause::TransportError,
        () = state.shutdown.cancelled() => CloseCause::ForcedShutdown,
    };
    coordinator.close(cause);

    // Closing dropped the last channel sender, so the write loop drains
    // and closes the socket. Wait for it so teardown is complete before
    // the connection task ends.
    if let Err(e) = writer.await {
        warn!(session_id = %session_id, error = %e, "write loop panicked");
    }
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    counter!(WS_DISCONNECTIONS_TOTAL, "cause" => cause_label(cause)).increment(1);
    debug!(session_id = %session_id, ?cause, "connection finished");
}

/// Drain the outbound channel into the socket. Owns the sink; closes it
/// exactly once on the way out.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Arc<str>>) {
    while let Some(text) = rx.recv().await {
        if sink.send(Message::Text(text.as_ref().into())).await.is_err() {
            // Peer is gone; the read side will surface the same failure.
            break;
        }
    }
    let _ = sink.close().await;
}

fn cause_label(cause: CloseCause) -> &'static str {
    match cause {
        CloseCause::ClientClosed => "client_closed",
        CloseCause::TransportError => "transport_error",
        CloseCause::ForcedShutdown => "forced_shutdown",
    }
}

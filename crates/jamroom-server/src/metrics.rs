//! Prometheus recorder install and the hub's metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder, once, at startup.
///
/// The returned handle lives in [`crate::state::AppState`]; the `/metrics`
/// route renders straight from it.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");
    info!("metrics recorder installed");
    handle
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: cause).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections rejected at the join handshake (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Messages published through the hub (counter, recorded by jamroom-hub).
pub const HUB_MESSAGES_PUBLISHED_TOTAL: &str = "hub_messages_published_total";
/// Deliveries dropped because a session's channel was full or closed
/// (counter, recorded by jamroom-hub).
pub const HUB_BROADCAST_DROPS_TOTAL: &str = "hub_broadcast_drops_total";
/// Backlog messages replayed to joiners (counter, recorded by jamroom-hub).
pub const HUB_BACKLOG_REPLAYED_TOTAL: &str = "hub_backlog_replayed_total";
/// Inbound frames skipped as undecodable (counter, recorded by jamroom-hub).
pub const HUB_DECODE_ERRORS_TOTAL: &str = "hub_decode_errors_total";

//! Shared application state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;

use jamroom_hub::Hub;

use crate::config::HubSettings;

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// The broadcast engine.
    pub hub: Arc<Hub>,
    /// Loaded configuration.
    pub settings: Arc<HubSettings>,
    /// Cancelled on shutdown; every live session observes it and closes
    /// with a forced-shutdown cause.
    pub shutdown: CancellationToken,
    /// Renders the `/metrics` endpoint.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Build state from loaded settings and an installed metrics recorder.
    #[must_use]
    pub fn new(settings: HubSettings, metrics: PrometheusHandle) -> Self {
        let hub = Arc::new(Hub::new(&settings.room.hub_options()));
        Self {
            hub,
            settings: Arc::new(settings),
            shutdown: CancellationToken::new(),
            metrics,
        }
    }
}

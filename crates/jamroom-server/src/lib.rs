//! # jamroom-server
//!
//! HTTP + WebSocket glue around the hub core.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Compiled defaults + `JAMROOM_*` environment overrides |
//! | `state` | Shared [`state::AppState`] cloned into handlers |
//! | `routes` | Router: index page, `/ws/{username}` upgrade, healthz, metrics |
//! | `ws` | Per-connection read/write loops bridging socket and coordinator |
//! | `metrics` | Prometheus recorder install + metric name constants |
//!
//! ## Data Flow
//!
//! `routes` upgrades a connection → `ws` builds the session handle and
//! outbound channel → `jamroom_hub` coordinator drives the protocol →
//! the write loop drains the channel into the socket.

#![deny(unsafe_code)]

pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::HubSettings;
pub use routes::router;
pub use state::AppState;

//! Server configuration.
//!
//! There is no settings file and no CLI surface: configuration is compiled
//! defaults with `JAMROOM_*` environment overrides applied on top. Types
//! still derive serde with per-field defaults so partial sources keep
//! working if a file layer is ever added. Invalid override values are
//! warned about and ignored rather than rejected, so a typo degrades to
//! default behavior instead of a refused startup.

use serde::{Deserialize, Serialize};
use tracing::warn;

use jamroom_core::frames;
use jamroom_hub::{HubOptions, SessionPolicy};

/// Root configuration for the jamroom server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Network settings.
    pub server: ServerSettings,
    /// Room behavior settings.
    pub room: RoomSettings,
}

/// Network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Room behavior settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Explicit backlog bound. `None` retains every persisted message.
    pub backlog_cap: Option<usize>,
    /// Per-session outbound channel capacity. A session that falls this
    /// far behind is treated as failed and torn down.
    pub outbound_buffer: usize,
    /// Whether a joiner receives its own join announcement.
    pub echo_join_to_self: bool,
    /// Whether non-JSON frames pass through verbatim.
    pub accept_raw_text: bool,
    /// Frame types broadcast live but excluded from the backlog.
    pub live_only_types: Vec<String>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            backlog_cap: None,
            outbound_buffer: 512,
            echo_join_to_self: false,
            accept_raw_text: false,
            live_only_types: vec![frames::TYPE_PAUSE.to_owned()],
        }
    }
}

impl RoomSettings {
    /// Hub construction options derived from these settings.
    #[must_use]
    pub fn hub_options(&self) -> HubOptions {
        HubOptions {
            backlog_cap: self.backlog_cap,
        }
    }

    /// Per-session policy derived from these settings.
    #[must_use]
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            echo_join_to_self: self.echo_join_to_self,
            accept_raw_text: self.accept_raw_text,
            live_only_types: self.live_only_types.clone(),
        }
    }
}

impl HubSettings {
    /// Defaults with `JAMROOM_*` environment overrides applied.
    #[must_use]
    pub fn load() -> Self {
        let mut settings = Self::default();
        settings.apply_overrides(|name| std::env::var(name).ok());
        settings
    }

    /// Apply overrides from a lookup function (the environment in
    /// production, a closure in tests).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> Option<T> {
            match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(var = name, value = raw, "ignoring unparseable override");
                    None
                }
            }
        }

        if let Some(host) = lookup("JAMROOM_HOST") {
            self.server.host = host;
        }
        if let Some(raw) = lookup("JAMROOM_PORT") {
            if let Some(port) = parse("JAMROOM_PORT", &raw) {
                self.server.port = port;
            }
        }
        if let Some(raw) = lookup("JAMROOM_BACKLOG_CAP") {
            if let Some(cap) = parse("JAMROOM_BACKLOG_CAP", &raw) {
                self.room.backlog_cap = Some(cap);
            }
        }
        if let Some(raw) = lookup("JAMROOM_OUTBOUND_BUFFER") {
            if let Some(buffer) = parse::<usize>("JAMROOM_OUTBOUND_BUFFER", &raw) {
                if buffer > 0 {
                    self.room.outbound_buffer = buffer;
                } else {
                    warn!("JAMROOM_OUTBOUND_BUFFER must be positive, ignoring");
                }
            }
        }
        if let Some(raw) = lookup("JAMROOM_ECHO_JOIN_TO_SELF") {
            if let Some(echo) = parse("JAMROOM_ECHO_JOIN_TO_SELF", &raw) {
                self.room.echo_join_to_self = echo;
            }
        }
        if let Some(raw) = lookup("JAMROOM_ACCEPT_RAW_TEXT") {
            if let Some(raw_text) = parse("JAMROOM_ACCEPT_RAW_TEXT", &raw) {
                self.room.accept_raw_text = raw_text;
            }
        }
    }
}

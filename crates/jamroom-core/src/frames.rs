//! Wire frames.
//!
//! The hub speaks newline-free text frames over the transport. In JSON mode
//! (the default protocol) every frame is an object carrying a `"type"`
//! discriminator: clients send `play`/`pause`/`resume` and the hub emits
//! `welcome` and `notification`. The hub treats all payloads as opaque —
//! the one value it inspects directly is [`TYPE_PAUSE`], which is broadcast
//! live but kept out of the backlog.
//!
//! Raw-text mode (an opt-in compatibility behavior) passes non-JSON frames
//! through verbatim instead of rejecting them.

use serde_json::{Value, json};

use crate::errors::HubError;

/// The discriminator key every tagged frame carries.
pub const TYPE_KEY: &str = "type";
/// Transient playback-pause events, excluded from backlog persistence.
pub const TYPE_PAUSE: &str = "pause";
/// Hub-emitted join/leave announcements.
pub const TYPE_NOTIFICATION: &str = "notification";
/// Hub-emitted greeting sent directly to a newcomer.
pub const TYPE_WELCOME: &str = "welcome";

/// One decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A JSON object with a string `"type"` discriminator.
    Tagged {
        /// The discriminator value.
        kind: String,
        /// The full object, re-broadcast as-is.
        value: Value,
    },
    /// Verbatim non-JSON text (raw-text mode only).
    Text(String),
}

impl Frame {
    /// Decode a raw inbound frame.
    ///
    /// A frame decodes to [`Frame::Tagged`] when it is a JSON object with a
    /// string `"type"` field. Anything else is a [`HubError::Decode`] —
    /// unless `accept_raw_text` is set, in which case text that is not
    /// valid JSON at all passes through as [`Frame::Text`].
    pub fn decode(raw: &str, accept_raw_text: bool) -> Result<Self, HubError> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) if accept_raw_text => return Ok(Self::Text(raw.to_owned())),
            Err(e) => return Err(HubError::decode(e)),
        };
        match value.get(TYPE_KEY).and_then(Value::as_str) {
            Some(kind) => Ok(Self::Tagged {
                kind: kind.to_owned(),
                value,
            }),
            None => Err(HubError::decode(format!(
                "frame is not an object with a string {TYPE_KEY:?} field"
            ))),
        }
    }

    /// The `"type"` discriminator, if this is a tagged frame.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Tagged { kind, .. } => Some(kind),
            Self::Text(_) => None,
        }
    }

    /// Serialize back to wire text.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Tagged { value, .. } => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Greeting frame sent directly to a newcomer after backlog replay.
#[must_use]
pub fn welcome(display_name: &str) -> Value {
    json!({
        TYPE_KEY: TYPE_WELCOME,
        "message": format!("Hi {display_name}! Welcome to the listening room!"),
    })
}

/// Hub announcement frame (joins, departures).
#[must_use]
pub fn notification(text: impl Into<String>) -> Value {
    json!({
        TYPE_KEY: TYPE_NOTIFICATION,
        "message": text.into(),
    })
}

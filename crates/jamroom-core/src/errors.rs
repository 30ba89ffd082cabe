//! Error taxonomy for the hub.
//!
//! Every failure a session can hit falls into one of four categories, and
//! the category decides the blast radius: `DuplicateSession` rejects the
//! connection before anything is sent, `Decode` skips one frame, `Transport`
//! and `ForcedShutdown` tear down exactly one session. No variant is ever
//! allowed to propagate across sessions.

use thiserror::Error;

use crate::ids::SessionId;

/// Convenience result alias for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// Hub failure categories.
#[derive(Debug, Error)]
pub enum HubError {
    /// A session with this ID is already registered. The connection is
    /// rejected and nothing is ever sent to it.
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    /// An inbound frame could not be decoded. The frame is skipped; the
    /// session stays active.
    #[error("failed to decode inbound frame: {reason}")]
    Decode {
        /// Human-readable decode failure description.
        reason: String,
    },

    /// Sending to or receiving from one session's transport failed. Tears
    /// down that session only.
    #[error("transport failure: {reason}")]
    Transport {
        /// Human-readable transport failure description.
        reason: String,
    },

    /// External termination request (server shutdown). Same teardown path
    /// as `Transport`, distinct notification text.
    #[error("forced shutdown")]
    ForcedShutdown,
}

impl HubError {
    /// Build a [`HubError::Decode`] from any displayable cause.
    pub fn decode(reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    /// Build a [`HubError::Transport`] from any displayable cause.
    pub fn transport(reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }
}

//! Branded identifier newtypes.
//!
//! A [`SessionId`] identifies one connection for its lifetime. It is minted
//! at accept time from a UUIDv7 — never derived from the client's display
//! name, which is neither unique nor stable.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of one connected session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mint a fresh session ID (UUIDv7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! # jamroom-hub
//!
//! The broadcast core: who is connected, what has been said, and how new
//! messages reach everyone.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | Live session set: add, idempotent remove, ordered snapshot |
//! | `backlog` | Ordered message history with an explicit optional bound |
//! | `engine` | [`engine::Hub`]: publish fan-out and replay-then-register joins |
//! | `lifecycle` | Per-session coordinator: connect, receive loop, teardown |
//!
//! ## Data Flow
//!
//! transport accept → `lifecycle` connect (replay + join announcement) →
//! receive loop decodes frames → `engine` publish → every registered
//! session's outbound channel. Transport glue lives in `jamroom-server`;
//! everything here is exercised with plain in-memory channels.

#![deny(unsafe_code)]

pub mod backlog;
pub mod engine;
pub mod lifecycle;
pub mod registry;

pub use engine::{Hub, HubOptions};
pub use lifecycle::{CloseCause, SessionCoordinator, SessionPolicy};
pub use registry::{Registry, SessionHandle};

//! # jamroom-core
//!
//! Foundation types for the jamroom broadcast hub.
//!
//! This crate provides the shared vocabulary the hub and server crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::SessionId`] as a UUIDv7 newtype
//! - **Errors**: [`errors::HubError`] hierarchy via `thiserror`
//! - **Frames**: [`frames::Frame`] inbound decode and the hub-emitted
//!   `welcome`/`notification` wire shapes
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `jamroom-hub` and `jamroom-server`.

#![deny(unsafe_code)]

pub mod errors;
pub mod frames;
pub mod ids;

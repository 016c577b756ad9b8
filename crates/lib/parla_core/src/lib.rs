//! # parla_core
//!
//! Core domain logic for Parla: authentication and session rotation,
//! role-play scenarios, conversations and AI chat completion.

pub mod auth;
pub mod chat;
pub mod conversations;
pub mod migrate;
pub mod models;
pub mod scenarios;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

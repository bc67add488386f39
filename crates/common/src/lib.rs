//! Shared message types and error helpers used across all
//! concierge crates.

pub mod error;
pub mod types;

pub use {
    error::FromMessage,
    types::{ChatKind, InboundMessage, MessageDirection, OutboundMessage},
};

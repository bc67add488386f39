//! Calls to the hosted backend functions.
//!
//! Two endpoints matter to the relay: one produces the reply text for a
//! customer message, the other records every message in the conversation
//! log. Both go through [`retry::retry_with_backoff`].

pub mod client;
pub mod endpoints;
pub mod error;
pub mod retry;

pub use {
    client::FunctionsClient,
    endpoints::{BackendFunctions, LogEntry, MessageLogger, ReplyGenerator, ReplyRequest},
    error::{Error, Result},
    retry::{RetryPolicy, retry_with_backoff},
};

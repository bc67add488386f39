//! Transport session lifecycle and its read-only status projection.

pub mod lifecycle;
pub mod status;

pub use {
    lifecycle::{ConnectionState, PairingArtifact, SessionLifecycle, StatusSnapshot, Transition},
    status::{SessionStatus, StatusSurface},
};

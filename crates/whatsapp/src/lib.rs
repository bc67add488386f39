//! WhatsApp Web transport.
//!
//! The browser session runs in a Node.js sidecar (venom-bot). This crate
//! optionally spawns that process, talks to it over a local WebSocket, and
//! exposes it as a [`concierge_channels::Transport`].

pub mod process;
pub mod sidecar;
pub mod transport;
pub mod types;

pub use {
    process::{SidecarProcess, SidecarSpawn, find_sidecar_dir, start_sidecar},
    sidecar::{SidecarHandle, connect_with_retry},
    transport::WhatsAppTransport,
    types::{GatewayMessage, SidecarMessage, VenomMessage},
};

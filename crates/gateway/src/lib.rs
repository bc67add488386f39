//! HTTP status surface: liveness, connection status and the pairing code.
//!
//! Every route only reads the session status record; none of them waits on
//! the transport.

pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};

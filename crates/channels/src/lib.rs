//! Chat transport capability.
//!
//! A transport (WhatsApp Web sidecar, test double, ...) implements
//! [`Transport`]: it emits lifecycle events and inbound messages on a single
//! ordered stream, sends text, and can be closed. Everything above this
//! crate talks to the transport only through these traits.

pub mod error;
pub mod gating;
pub mod plugin;

pub use {
    error::{Error, Result},
    gating::{InboundGate, SkipReason},
    plugin::{
        ChannelOutbound, EventReceiver, EventSender, LoginOutcome, Transport, TransportEvent,
        event_channel,
    },
};

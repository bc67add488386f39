//! Message relay: the glue between the transport and the backend functions.
//!
//! Flow: transport event → lifecycle update, or filter → throttle on
//! arrival → per-sender worker → log inbound → generate reply (with
//! fallback) → send → log outbound.

pub mod dispatch;
pub mod pipeline;
pub mod pump;
pub mod reply;
pub mod throttle;

pub use {
    dispatch::{Dispatched, Dispatcher, DispatcherLimits},
    pipeline::{Admission, RelayOutcome, RelayPipeline},
    pump::{PumpExit, run_event_pump},
    reply::ReplySource,
    throttle::RateLimiter,
};

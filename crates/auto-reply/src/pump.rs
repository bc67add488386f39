use std::sync::Arc;

use {
    concierge_channels::{EventReceiver, TransportEvent},
    concierge_sessions::{ConnectionState, SessionLifecycle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
};

use crate::dispatch::Dispatcher;

/// Why the event pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// Shutdown was requested.
    Cancelled,
    /// The transport closed its event stream.
    StreamEnded,
}

/// Drive the lifecycle and the dispatcher from one transport event stream.
///
/// Lifecycle events are applied before any later message is dispatched, so
/// the state seen by the status surface never lags the traffic behind it.
/// Dispatching never waits on a sender's queue, so a busy sender cannot
/// hold up lifecycle events or shutdown.
pub async fn run_event_pump(
    mut events: EventReceiver,
    lifecycle: Arc<SessionLifecycle>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
) -> PumpExit {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                info!("event pump stopping");
                return PumpExit::Cancelled;
            },
            event = events.recv() => event,
        };

        let Some(event) = event else {
            if lifecycle.state() != ConnectionState::Failed {
                lifecycle.on_transport_closed(Some("transport event stream ended".into()));
            }
            info!("transport event stream ended");
            return PumpExit::StreamEnded;
        };

        debug!(event = event.label(), "transport event");
        match event {
            TransportEvent::PairingCode { payload, attempt } => {
                info!(attempt, "pairing code issued, waiting for scan");
                lifecycle.on_pairing_code_issued(payload, attempt);
            },
            TransportEvent::Login(outcome) => {
                lifecycle.on_login_result(outcome);
            },
            TransportEvent::Closed { reason } => {
                lifecycle.on_transport_closed(reason);
            },
            TransportEvent::InitFailed { reason } => {
                error!(%reason, "transport failed to initialise");
                lifecycle.on_init_failed(reason);
            },
            TransportEvent::Message(msg) => {
                dispatcher.dispatch(msg);
            },
        }
    }
}

use {async_trait::async_trait, concierge_common::InboundMessage, tokio::sync::mpsc};

use crate::Result;

/// Capacity of the transport event stream.
pub const EVENT_BUFFER: usize = 256;

// ── Transport events ────────────────────────────────────────────────────────

/// Result of a login step reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Pairing code scanned, login handshake still in progress.
    Intermediate,
    /// Session is logged in and ready to exchange messages.
    Success { phone_number: Option<String> },
    /// The transport reports that it is not logged in.
    Rejected,
}

/// Everything a transport reports, in arrival order.
///
/// Lifecycle events and inbound messages share one stream so that a
/// message can never overtake the lifecycle event that preceded it.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A new pairing (scan) code was issued; replaces any previous one.
    PairingCode {
        payload: String,
        attempt: Option<u32>,
    },
    Login(LoginOutcome),
    /// The session was closed (browser closed, logged out, socket lost).
    Closed { reason: Option<String> },
    /// The transport could not be initialised at all.
    InitFailed { reason: String },
    Message(InboundMessage),
}

impl TransportEvent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PairingCode { .. } => "pairing_code",
            Self::Login(LoginOutcome::Intermediate) => "login_intermediate",
            Self::Login(LoginOutcome::Success { .. }) => "login_success",
            Self::Login(LoginOutcome::Rejected) => "login_rejected",
            Self::Closed { .. } => "closed",
            Self::InitFailed { .. } => "init_failed",
            Self::Message(_) => "message",
        }
    }
}

/// Receiving end of a transport event stream.
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Sending end of a transport event stream.
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Create a bounded event stream.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_BUFFER)
}

// ── Capability traits ───────────────────────────────────────────────────────

/// Send messages through a transport.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Deliver `text` to `to`. A failed delivery is reported, never retried
    /// here.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;
}

/// A chat transport session.
#[async_trait]
pub trait Transport: ChannelOutbound {
    /// Transport identifier (e.g. "whatsapp-web").
    fn id(&self) -> &str;

    /// Start the session and return its event stream.
    ///
    /// Errors here mean the transport could not be initialised; the caller
    /// records that as a failed session.
    async fn start(&self) -> Result<EventReceiver>;

    /// Close the session. Best effort; used during shutdown.
    async fn close(&self) -> Result<()>;
}

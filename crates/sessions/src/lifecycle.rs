//! Connection state machine for the chat transport session.
//!
//! ```text
//! Disconnected ──pairing code──▶ PairingReady ──scan read──▶ Connecting ──logged in──▶ Connected
//!      ▲                              │                          │                        │
//!      └──────────── closed / login rejected ◀───────────────────┴────────────────────────┘
//! any ──init failed──▶ Failed (terminal for the process)
//! ```
//!
//! The state, the pairing artifact, and the failure reason live in one
//! record behind one lock, so readers never see a torn combination.

use std::sync::{PoisonError, RwLock};

use {
    chrono::{DateTime, Utc},
    concierge_channels::LoginOutcome,
    serde::Serialize,
    tokio::sync::watch,
    tracing::{debug, info, warn},
};

/// Transport connection state. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    PairingReady,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::PairingReady => "pairing_ready",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }

    /// Vocabulary understood by the operator dashboard.
    pub fn dashboard_label(self) -> &'static str {
        match self {
            Self::PairingReady => "qr_ready",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-time scan code shown to the operator while pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingArtifact {
    /// Opaque payload (typically a `data:image/png;base64,...` URL).
    pub payload: String,
    pub issued_at: DateTime<Utc>,
    /// Issue counter reported by the transport, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

/// Consistent copy of the status record.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    /// Present only while `state` is `PairingReady`.
    pub pairing: Option<PairingArtifact>,
    /// Phone number of the logged-in account, when the transport reports it.
    pub phone_number: Option<String>,
    /// Why the session failed or was last closed.
    pub reason: Option<String>,
    /// Time of the last state change.
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// The transport can send messages.
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn has_pairing_artifact(&self) -> bool {
        self.pairing.is_some()
    }
}

/// Outcome of feeding one event to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

enum Event {
    PairingCode {
        payload: String,
        attempt: Option<u32>,
    },
    Login(LoginOutcome),
    Closed {
        reason: Option<String>,
    },
    InitFailed {
        reason: String,
    },
}

/// Owns the process-wide connection state.
///
/// All mutation goes through the `on_*` methods; readers get
/// [`StatusSnapshot`]s or subscribe to state changes.
pub struct SessionLifecycle {
    record: RwLock<StatusSnapshot>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            record: RwLock::new(StatusSnapshot {
                state: ConnectionState::Disconnected,
                pairing: None,
                phone_number: None,
                reason: None,
                updated_at: Utc::now(),
            }),
            state_tx,
        }
    }

    /// Current status, read atomically.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Receive every state change (latest value semantics).
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The transport issued a pairing code. Any previous code is discarded.
    pub fn on_pairing_code_issued(&self, payload: String, attempt: Option<u32>) -> Transition {
        self.apply(Event::PairingCode { payload, attempt })
    }

    pub fn on_login_result(&self, outcome: LoginOutcome) -> Transition {
        self.apply(Event::Login(outcome))
    }

    pub fn on_transport_closed(&self, reason: Option<String>) -> Transition {
        self.apply(Event::Closed { reason })
    }

    /// The transport could not be initialised. Not retried here; a
    /// supervisor restarts the process.
    pub fn on_init_failed(&self, reason: String) -> Transition {
        self.apply(Event::InitFailed { reason })
    }

    fn apply(&self, event: Event) -> Transition {
        let mut record = self
            .record
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let from = record.state;

        let to = match (from, &event) {
            (ConnectionState::Failed, _) => {
                warn!("ignoring transport event, session already failed");
                return Transition { from, to: from };
            },
            (_, Event::InitFailed { .. }) => ConnectionState::Failed,
            (ConnectionState::Disconnected, Event::Closed { .. }) => {
                debug!("transport closed while already disconnected");
                return Transition { from, to: from };
            },
            (ConnectionState::Connected, Event::PairingCode { .. }) => {
                warn!("ignoring pairing code while connected");
                return Transition { from, to: from };
            },
            (_, Event::PairingCode { .. }) => ConnectionState::PairingReady,
            (
                ConnectionState::Disconnected | ConnectionState::PairingReady,
                Event::Login(LoginOutcome::Intermediate),
            ) => ConnectionState::Connecting,
            (_, Event::Login(LoginOutcome::Intermediate)) => from,
            (_, Event::Login(LoginOutcome::Success { .. })) => ConnectionState::Connected,
            (_, Event::Login(LoginOutcome::Rejected) | Event::Closed { .. }) => {
                ConnectionState::Disconnected
            },
        };

        match event {
            Event::PairingCode { payload, attempt } => {
                record.pairing = Some(PairingArtifact {
                    payload,
                    issued_at: Utc::now(),
                    attempt,
                });
            },
            Event::Login(LoginOutcome::Success { phone_number }) => {
                record.pairing = None;
                record.reason = None;
                if phone_number.is_some() {
                    record.phone_number = phone_number;
                }
            },
            Event::Login(_) => record.pairing = None,
            Event::Closed { reason } => {
                record.pairing = None;
                record.reason = reason;
            },
            Event::InitFailed { reason } => {
                record.pairing = None;
                record.reason = Some(reason);
            },
        }

        let transition = Transition { from, to };
        if transition.changed() || to == ConnectionState::PairingReady {
            record.state = to;
            record.updated_at = Utc::now();
            self.state_tx.send_replace(to);
            info!(from = %from, to = %to, "session state changed");
        }
        transition
    }
}

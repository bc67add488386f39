use std::sync::Arc;

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
};

use crate::lifecycle::{ConnectionState, PairingArtifact, SessionLifecycle};

/// What the status surface reports about the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub is_ready: bool,
    pub has_pairing_artifact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the state last changed.
    pub since: DateTime<Utc>,
}

/// Read-only view of a [`SessionLifecycle`].
#[derive(Clone)]
pub struct StatusSurface {
    lifecycle: Arc<SessionLifecycle>,
}

impl StatusSurface {
    pub fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn status(&self) -> SessionStatus {
        let snap = self.lifecycle.snapshot();
        SessionStatus {
            state: snap.state,
            is_ready: snap.is_ready(),
            has_pairing_artifact: snap.has_pairing_artifact(),
            phone_number: snap.phone_number,
            reason: snap.reason,
            since: snap.updated_at,
        }
    }

    /// The pairing artifact, only while the session is waiting for a scan.
    pub fn pairing_code(&self) -> Option<PairingArtifact> {
        let snap = self.lifecycle.snapshot();
        match snap.state {
            ConnectionState::PairingReady => snap.pairing,
            _ => None,
        }
    }
}

//! JSON frames exchanged with the sidecar.

use {
    chrono::{DateTime, TimeZone, Utc},
    concierge_channels::{LoginOutcome, TransportEvent},
    concierge_common::{ChatKind, InboundMessage},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

/// Sender id used by WhatsApp for status updates.
const STATUS_BROADCAST: &str = "status@broadcast";

/// Frames sent by the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    /// A new scan code (base64 PNG data URL).
    Qr {
        qr: String,
        #[serde(default)]
        attempt: Option<u32>,
    },
    /// Raw venom session status, e.g. `isLogged` or `browserClose`.
    Status { status: String },
    /// The client finished starting and can send messages.
    Ready {
        #[serde(default)]
        phone_number: Option<String>,
    },
    /// The browser session could not be created.
    InitFailed { error: String },
    Message { message: VenomMessage },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Error { error: String },
}

/// Frames sent to the sidecar.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Create the browser session.
    Start { session: String, headless: bool },
    SendText {
        request_id: String,
        to: String,
        text: String,
    },
    /// Close the browser session.
    Close,
}

/// The subset of a venom message object the relay needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenomMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_group_msg: bool,
    #[serde(default)]
    pub from_me: bool,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl VenomMessage {
    pub fn kind(&self) -> ChatKind {
        if self.is_group_msg {
            ChatKind::Group
        } else if self.from == STATUS_BROADCAST {
            ChatKind::Broadcast
        } else if self.from_me {
            ChatKind::SelfAuthored
        } else {
            ChatKind::Direct
        }
    }

    pub fn into_inbound(self) -> InboundMessage {
        let kind = self.kind();
        let received_at = self
            .timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);
        InboundMessage {
            message_id: self.id,
            sender_id: self.from,
            body: self.body,
            kind,
            received_at: clamp_to_now(received_at),
        }
    }
}

/// Sidecar clocks can run ahead; never report arrival in the future.
fn clamp_to_now(at: DateTime<Utc>) -> DateTime<Utc> {
    at.min(Utc::now())
}

/// Map a venom session status to a lifecycle event.
///
/// Progress statuses (`initBrowser`, `waitChat`, ...) map to nothing.
pub fn status_event(status: &str) -> Option<TransportEvent> {
    let event = match status {
        "qrReadSuccess" => TransportEvent::Login(LoginOutcome::Intermediate),
        "isLogged" | "successChat" => TransportEvent::Login(LoginOutcome::Success {
            phone_number: None,
        }),
        "notLogged" | "qrReadFail" | "qrReadError" => TransportEvent::Login(LoginOutcome::Rejected),
        "browserClose" | "autocloseCalled" | "desconnectedMobile" | "serverClose"
        | "deleteToken" => TransportEvent::Closed {
            reason: Some(status.to_string()),
        },
        other => {
            debug!(status = other, "ignoring sidecar progress status");
            return None;
        },
    };
    Some(event)
}

impl SidecarMessage {
    /// The transport event this frame carries, if any.
    ///
    /// `SendResult` and `Error` frames are handled by the connection itself.
    pub fn into_event(self) -> Option<TransportEvent> {
        match self {
            Self::Qr { qr, attempt } => Some(TransportEvent::PairingCode {
                payload: qr,
                attempt,
            }),
            Self::Status { status } => status_event(&status),
            Self::Ready { phone_number } => {
                Some(TransportEvent::Login(LoginOutcome::Success { phone_number }))
            },
            Self::InitFailed { error } => Some(TransportEvent::InitFailed { reason: error }),
            Self::Message { message } => Some(TransportEvent::Message(message.into_inbound())),
            Self::SendResult { .. } | Self::Error { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SidecarMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn qr_frame_becomes_pairing_code() {
        let event = parse(r#"{"type":"qr","qr":"data:image/png;base64,AAA","attempt":2}"#)
            .into_event()
            .unwrap();
        assert!(matches!(
            event,
            TransportEvent::PairingCode { ref payload, attempt: Some(2) } if payload.starts_with("data:image/png")
        ));
    }

    #[test]
    fn venom_statuses_map_to_lifecycle() {
        assert!(matches!(
            status_event("qrReadSuccess"),
            Some(TransportEvent::Login(LoginOutcome::Intermediate))
        ));
        assert!(matches!(
            status_event("isLogged"),
            Some(TransportEvent::Login(LoginOutcome::Success { .. }))
        ));
        assert!(matches!(
            status_event("notLogged"),
            Some(TransportEvent::Login(LoginOutcome::Rejected))
        ));
        assert!(matches!(
            status_event("browserClose"),
            Some(TransportEvent::Closed { reason: Some(ref r) }) if r == "browserClose"
        ));
        assert!(status_event("waitChat").is_none());
    }

    #[test]
    fn init_failed_frame() {
        let event = parse(r#"{"type":"init_failed","error":"Chromium not found"}"#)
            .into_event()
            .unwrap();
        assert!(matches!(event, TransportEvent::InitFailed { ref reason } if reason == "Chromium not found"));
    }

    #[test]
    fn message_classification() {
        let direct = parse(
            r#"{"type":"message","message":{"id":"m1","from":"972501234567@c.us","body":"שלום","isGroupMsg":false,"fromMe":false,"timestamp":1700000000}}"#,
        );
        let Some(TransportEvent::Message(msg)) = direct.into_event() else {
            panic!("expected a message event");
        };
        assert_eq!(msg.kind, ChatKind::Direct);
        assert_eq!(msg.sender_id, "972501234567@c.us");
        assert_eq!(msg.message_id.as_deref(), Some("m1"));
        assert_eq!(msg.received_at.timestamp(), 1_700_000_000);

        let cases = [
            (r#"{"from":"1203@g.us","isGroupMsg":true}"#, ChatKind::Group),
            (r#"{"from":"status@broadcast"}"#, ChatKind::Broadcast),
            (r#"{"from":"972501234567@c.us","fromMe":true}"#, ChatKind::SelfAuthored),
        ];
        for (json, kind) in cases {
            let msg: VenomMessage = serde_json::from_str(json).unwrap();
            assert_eq!(msg.kind(), kind, "{json}");
        }
    }

    #[test]
    fn send_text_frame_shape() {
        let frame = GatewayMessage::SendText {
            request_id: "r1".into(),
            to: "972501234567@c.us".into(),
            text: "hi".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "send_text");
        assert_eq!(value["request_id"], "r1");
        assert_eq!(
            serde_json::to_value(GatewayMessage::Close).unwrap(),
            serde_json::json!({"type": "close"})
        );
    }

    #[test]
    fn send_results_are_not_events() {
        let frame = parse(r#"{"type":"send_result","request_id":"r1","success":true}"#);
        assert!(frame.into_event().is_none());
    }
}

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// How an inbound message reached the business account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// One-to-one chat with a customer.
    Direct,
    /// Message posted in a group the account belongs to.
    Group,
    /// Status/broadcast list traffic.
    Broadcast,
    /// Authored by the business account itself (echo of our own sends).
    #[serde(rename = "self")]
    SelfAuthored,
}

impl ChatKind {
    /// Only direct chats are ever answered.
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Broadcast => "broadcast",
            Self::SelfAuthored => "self",
        };
        f.write_str(s)
    }
}

/// A customer message handed over by the transport.
///
/// Consumed once by the relay pipeline and dropped afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-level id, when the transport provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Sender identity (e.g. `972501234567@c.us`); replies go back here.
    pub sender_id: String,
    pub body: String,
    pub kind: ChatKind,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn direct(sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            sender_id: sender_id.into(),
            body: body.into(),
            kind: ChatKind::Direct,
            received_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ChatKind) -> Self {
        self.kind = kind;
        self
    }

    /// Body with surrounding whitespace removed.
    pub fn text(&self) -> &str {
        self.body.trim()
    }
}

/// A reply on its way back to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub body: String,
    /// Id of the inbound message this answers; kept for logging only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn reply_to(inbound: &InboundMessage, body: impl Into<String>) -> Self {
        Self {
            recipient_id: inbound.sender_id.clone(),
            body: body.into(),
            in_reply_to: inbound.message_id.clone(),
        }
    }
}

/// Direction tag sent to the message logging endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

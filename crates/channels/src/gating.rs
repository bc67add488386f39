use concierge_common::{ChatKind, InboundMessage};

/// Why an inbound message was dropped without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Group, broadcast, or our own message.
    NotDirect(ChatKind),
    /// Nothing but whitespace.
    EmptyBody,
    /// Sender is not on a non-empty allowlist.
    NotAllowlisted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDirect(kind) => write!(f, "{kind} message"),
            Self::EmptyBody => f.write_str("empty body"),
            Self::NotAllowlisted => f.write_str("sender not allowlisted"),
        }
    }
}

/// Decides which inbound messages enter the relay pipeline.
///
/// Dropping is silent: it is not an error and produces no reply.
#[derive(Debug, Clone, Default)]
pub struct InboundGate {
    allowlist: Vec<String>,
}

impl InboundGate {
    /// `allowlist` holds phone numbers, optionally ending in `*` for a
    /// prefix match. Empty means everyone is allowed.
    pub fn new(allowlist: &[String]) -> Self {
        let allowlist = allowlist
            .iter()
            .map(|entry| {
                let wildcard = entry.trim().ends_with('*');
                let mut digits = phone_digits(entry);
                if wildcard {
                    digits.push('*');
                }
                digits
            })
            .filter(|entry| !entry.is_empty())
            .collect();
        Self { allowlist }
    }

    pub fn check(&self, msg: &InboundMessage) -> Result<(), SkipReason> {
        if !msg.kind.is_direct() {
            return Err(SkipReason::NotDirect(msg.kind));
        }
        if msg.text().is_empty() {
            return Err(SkipReason::EmptyBody);
        }
        if !self.is_allowed(&msg.sender_id) {
            return Err(SkipReason::NotAllowlisted);
        }
        Ok(())
    }

    pub fn is_allowed(&self, sender_id: &str) -> bool {
        if self.allowlist.is_empty() {
            return true;
        }
        let sender = phone_digits(sender_id);
        self.allowlist.iter().any(|entry| match entry.strip_suffix('*') {
            Some(prefix) => sender.starts_with(prefix),
            None => *entry == sender,
        })
    }
}

/// Digits of the user part of a sender identity.
///
/// `+972 50-123-4567` and `972501234567@c.us` both become `972501234567`.
fn phone_digits(id: &str) -> String {
    let user = id.split('@').next().unwrap_or(id);
    user.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_direct_messages_pass() {
        let gate = InboundGate::default();
        for kind in [ChatKind::Group, ChatKind::Broadcast, ChatKind::SelfAuthored] {
            let msg = InboundMessage::direct("972501234567@c.us", "hi").with_kind(kind);
            assert_eq!(gate.check(&msg), Err(SkipReason::NotDirect(kind)));
        }
        let msg = InboundMessage::direct("972501234567@c.us", "hi");
        assert_eq!(gate.check(&msg), Ok(()));
    }

    #[test]
    fn whitespace_body_is_dropped() {
        let gate = InboundGate::default();
        let msg = InboundMessage::direct("972501234567@c.us", " \n\t ");
        assert_eq!(gate.check(&msg), Err(SkipReason::EmptyBody));
    }

    #[test]
    fn allowlist_matches_phone_part() {
        let gate = InboundGate::new(&["+972 50-123-4567".into()]);
        assert!(gate.is_allowed("972501234567@c.us"));
        assert!(!gate.is_allowed("972509999999@c.us"));
    }

    #[test]
    fn allowlist_prefix_wildcard() {
        let gate = InboundGate::new(&["+97250*".into()]);
        assert!(gate.is_allowed("972501234567@c.us"));
        assert!(!gate.is_allowed("15551234567@c.us"));

        let msg = InboundMessage::direct("15551234567@c.us", "hello");
        assert_eq!(gate.check(&msg), Err(SkipReason::NotAllowlisted));
    }

    #[test]
    fn lone_wildcard_allows_everyone() {
        let gate = InboundGate::new(&["*".into()]);
        assert!(gate.is_allowed("15551234567@c.us"));
    }
}

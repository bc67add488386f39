use std::{sync::Arc, time::Instant};

use {
    chrono::{DateTime, Utc},
    concierge_channels::{ChannelOutbound, InboundGate, SkipReason},
    concierge_common::{InboundMessage, MessageDirection, OutboundMessage},
    concierge_config::{ConciergeConfig, ReplyTexts},
    concierge_functions::{LogEntry, MessageLogger, ReplyGenerator, ReplyRequest},
    tracing::{debug, info, warn},
};

use crate::{
    reply::{ReplySource, resolve_reply},
    throttle::RateLimiter,
};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Dropped by the inbound filter. Not an error.
    Skipped(SkipReason),
    /// Over the per-sender limit; the courtesy notice was (or failed to be)
    /// sent.
    Throttled { notice_sent: bool },
    /// A reply was delivered.
    Delivered { source: ReplySource },
    /// A reply was produced but the transport could not deliver it.
    SendFailed { source: ReplySource },
}

/// Admission decision for one inbound message, taken when it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Dropped by the inbound filter; the limiter was not consulted.
    Skip(SkipReason),
    /// Over the per-sender limit; only the notice goes out.
    Throttled,
    /// Counted against the sender's window; relay it.
    Admitted,
}

/// The per-message workflow.
///
/// Steps run in order and each rejection short-circuits the rest:
/// filter, admission, log inbound, generate reply, send, log outbound.
/// [`admit`](Self::admit) covers the first two and must run at arrival
/// time; [`relay`](Self::relay) covers the rest and may run later.
pub struct RelayPipeline {
    business_phone: String,
    texts: ReplyTexts,
    gate: InboundGate,
    limiter: Arc<RateLimiter>,
    replies: Arc<dyn ReplyGenerator>,
    logger: Arc<dyn MessageLogger>,
    outbound: Arc<dyn ChannelOutbound>,
}

impl RelayPipeline {
    pub fn new(
        config: &ConciergeConfig,
        replies: Arc<dyn ReplyGenerator>,
        logger: Arc<dyn MessageLogger>,
        outbound: Arc<dyn ChannelOutbound>,
    ) -> Self {
        Self {
            business_phone: config.business.phone.clone(),
            texts: config.replies.clone(),
            gate: InboundGate::new(&config.gating.allowlist),
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            replies,
            logger,
            outbound,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Filter `inbound` and count it against its sender's window as of
    /// `arrived`.
    pub fn admit(&self, inbound: &InboundMessage, arrived: Instant) -> Admission {
        let sender = inbound.sender_id.as_str();

        if let Err(reason) = self.gate.check(inbound) {
            debug!(sender, %reason, "inbound message skipped");
            return Admission::Skip(reason);
        }

        if !self.limiter.admit_at(sender, arrived) {
            info!(sender, "sender throttled");
            return Admission::Throttled;
        }
        Admission::Admitted
    }

    /// Run the whole workflow for a message arriving now.
    pub async fn handle(&self, inbound: &InboundMessage) -> RelayOutcome {
        match self.admit(inbound, Instant::now()) {
            Admission::Skip(reason) => RelayOutcome::Skipped(reason),
            Admission::Throttled => self.send_throttle_notice(&inbound.sender_id).await,
            Admission::Admitted => self.relay(inbound).await,
        }
    }

    /// The notice itself is neither throttled nor logged.
    pub async fn send_throttle_notice(&self, sender: &str) -> RelayOutcome {
        let notice_sent = match self.outbound.send_text(sender, &self.texts.throttled).await {
            Ok(()) => true,
            Err(e) => {
                warn!(sender, error = %e, "failed to send throttle notice");
                false
            },
        };
        RelayOutcome::Throttled { notice_sent }
    }

    /// Log, generate, send and log again for an admitted message.
    pub async fn relay(&self, inbound: &InboundMessage) -> RelayOutcome {
        let sender = inbound.sender_id.as_str();
        let text = inbound.text();
        info!(sender, chars = text.chars().count(), "relaying inbound message");
        self.log(sender, text, MessageDirection::Incoming, inbound.received_at)
            .await;

        let request = ReplyRequest {
            phone: self.business_phone.clone(),
            user_id: sender.to_string(),
            text: text.to_string(),
        };
        let (body, source) = resolve_reply(self.replies.generate_reply(&request).await, &self.texts);
        let reply = OutboundMessage::reply_to(inbound, body);

        if let Err(e) = self
            .outbound
            .send_text(&reply.recipient_id, &reply.body)
            .await
        {
            warn!(
                sender,
                in_reply_to = reply.in_reply_to.as_deref().unwrap_or("-"),
                error = %e,
                "failed to deliver reply"
            );
            return RelayOutcome::SendFailed { source };
        }

        self.log(&reply.recipient_id, &reply.body, MessageDirection::Outgoing, Utc::now())
            .await;
        debug!(sender, fallback = source.is_fallback(), "reply delivered");
        RelayOutcome::Delivered { source }
    }

    /// Best effort: failures are reported and swallowed.
    async fn log(&self, user_id: &str, text: &str, direction: MessageDirection, at: DateTime<Utc>) {
        let entry = LogEntry {
            phone: self.business_phone.clone(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            message_type: direction,
            timestamp: at,
        };
        if let Err(e) = self.logger.log_message(&entry).await {
            warn!(
                user_id,
                direction = direction.as_str(),
                error = %e,
                "failed to log message"
            );
        }
    }
}

use {
    concierge_config::ReplyTexts,
    concierge_functions::{Error, Result},
    tracing::warn,
};

/// Where the text sent to the customer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// The backend produced it.
    Generated,
    /// The backend answered with nothing; the "unavailable" text was used.
    Unavailable,
    /// Every attempt failed; the "technical error" apology was used.
    TechnicalError,
}

impl ReplySource {
    pub fn is_fallback(self) -> bool {
        self != Self::Generated
    }
}

/// Turn the reply endpoint's result into the text the customer receives.
///
/// Never returns an empty body.
pub fn resolve_reply(result: Result<String>, texts: &ReplyTexts) -> (String, ReplySource) {
    match result {
        Ok(text) if !text.trim().is_empty() => (text, ReplySource::Generated),
        Ok(_) | Err(Error::EmptyReply { .. }) => {
            warn!("reply endpoint returned no text, using fallback");
            (texts.unavailable.clone(), ReplySource::Unavailable)
        },
        Err(e) => {
            warn!(error = %e, "reply generation failed, using fallback");
            (texts.technical_error.clone(), ReplySource::TechnicalError)
        },
    }
}

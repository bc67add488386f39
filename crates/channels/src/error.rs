use std::error::Error as StdError;

/// Crate-wide result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed transport errors shared across transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport is not connected (not started, closed, or failed).
    #[error("transport unavailable: {message}")]
    Unavailable { message: String },

    /// The transport accepted the request but reported a failed delivery.
    #[error("send to {to} failed: {reason}")]
    SendFailed { to: String, reason: String },

    /// No acknowledgement arrived in time.
    #[error("transport did not answer within {seconds}s")]
    Timeout { seconds: u64 },

    /// Wrapped source error from an external dependency.
    #[error("transport operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn send_failed(to: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SendFailed {
            to: to.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

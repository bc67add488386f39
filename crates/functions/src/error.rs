#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{function} returned HTTP {status}: {body}")]
    Status {
        function: String,
        status: u16,
        body: String,
    },

    #[error("{function} timed out after {millis}ms")]
    Timeout { function: String, millis: u128 },

    #[error("{function} request failed: {source}")]
    Request {
        function: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{function} returned an unreadable body: {source}")]
    Decode {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{function} returned an empty reply")]
    EmptyReply { function: String },

    #[error("{function} failed after {attempts} attempts: {last}")]
    Exhausted {
        function: String,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Whether another attempt could succeed.
    ///
    /// An empty reply is an answer, not a failure of the call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::EmptyReply { .. } | Self::Exhausted { .. })
    }

    /// The failure behind an exhausted retry loop, or `self`.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The agent card could not be retrieved or is not a JSON object.
    #[error("failed to fetch agent card from {url}: {reason}")]
    DescriptorFetch { url: String, reason: String },

    /// The agent endpoint is unreachable. Fatal to the agent binding.
    #[error("cannot reach agent at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("agent did not respond within {0:?}")]
    Timeout(Duration),

    #[error("agent returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// One envelope could not be understood. The exchange continues.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { raw: String, reason: String },

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn descriptor_fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::DescriptorFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn malformed(raw: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedEnvelope {
            raw: raw.into(),
            reason: reason.to_string(),
        }
    }

    /// Classify a transport failure of a request to `url`.
    #[must_use]
    pub fn from_request(url: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Reqwest(err)
        }
    }

    /// Whether the agent binding should be torn down.
    pub fn is_fatal_connection(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }

    pub fn is_malformed_envelope(&self) -> bool {
        matches!(self, Self::MalformedEnvelope { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single provider call (list or update).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("provider error ({code}): {message}")]
    Provider { code: String, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request signing failed: {0}")]
    Signing(String),
}

impl StoreError {
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Whether the call was abandoned because its time budget ran out.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Problems with the inbound request, detected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value {value:?} for {record_type} record")]
    InvalidValue { record_type: String, value: String },

    #[error("ttl must be a positive integer")]
    InvalidTtl,

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("unsupported provider: {0}")]
    UnknownProvider(String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_detection() {
        assert!(StoreError::Timeout(Duration::from_secs(3)).is_timeout());
        assert!(!StoreError::provider("Forbidden", "denied").is_timeout());
        assert!(!StoreError::malformed("eof").is_timeout());
    }

    #[test]
    fn test_display_carries_cause() {
        let err = StoreError::provider("InvalidAccessKeyId.NotFound", "Specified access key is not found.");
        assert_eq!(
            err.to_string(),
            "provider error (InvalidAccessKeyId.NotFound): Specified access key is not found."
        );

        let err = InputError::InvalidValue {
            record_type: "A".to_string(),
            value: "1.2.3".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value \"1.2.3\" for A record");
    }
}

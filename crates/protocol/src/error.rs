use serde::{Deserialize, Serialize};

/// A failed upload attempt, normalized from any non-success response or
/// outright network failure.
///
/// `status` is the HTTP status code; `0` means no response was received at
/// all. `error` carries the service's machine-readable error code when one
/// was present in the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("upload failed with status {status}: {message}")]
pub struct TransportError {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransportError {
    /// A failure with no response received (connection refused, DNS, ...).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            message: message.into(),
            error: None,
        }
    }

    /// A failure with an HTTP status and message.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: None,
        }
    }
}

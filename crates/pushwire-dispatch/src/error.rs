use pushwire_storage::{PayloadError, StorageError};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the dispatch engine.
///
/// Only `InvalidPayload`, `AppNotFound` and storage errors raised before the
/// delivery log is opened ever reach the caller of `send`; anything that
/// happens afterwards is absorbed into the log's terminal status.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("App not found: {0}")]
    AppNotFound(Uuid),

    #[error("Delivery log not found: {0}")]
    LogNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dispatch task aborted: {0}")]
    Aborted(String),
}

impl DispatchError {
    /// Returns `true` for errors the caller can fix by changing the request.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidPayload(_) | Self::AppNotFound(_))
    }
}

/// Failure reported by a push transport for a single endpoint.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The push service answered with a non-success HTTP status.
    #[error("push service responded with {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("push request failed: {0}")]
    Request(String),

    /// The payload could not be encrypted for this subscriber.
    #[error("payload encryption failed: {0}")]
    Encryption(String),

    /// The VAPID authorization could not be built.
    #[error("VAPID signing failed: {0}")]
    Vapid(String),
}

impl TransportError {
    /// HTTP status returned by the push service, if there was a response.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_only_for_responses() {
        let rejected = TransportError::Rejected {
            status: 410,
            body: "gone".into(),
        };
        assert_eq!(rejected.status_code(), Some(410));
        assert_eq!(TransportError::Request("timeout".into()).status_code(), None);
        assert_eq!(TransportError::Encryption("bad key".into()).status_code(), None);
    }

    #[test]
    fn test_client_errors() {
        assert!(DispatchError::InvalidPayload(PayloadError::MissingTitle).is_client_error());
        assert!(DispatchError::AppNotFound(Uuid::nil()).is_client_error());
        assert!(!DispatchError::Storage(StorageError::internal("boom")).is_client_error());
        assert_eq!(
            DispatchError::InvalidPayload(PayloadError::MissingTitle).to_string(),
            "Invalid payload: title is required in payload"
        );
    }
}

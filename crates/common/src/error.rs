use thiserror::Error;

use crate::types::FailureKind;

/// Rejected recipient record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("recipient address must not be empty")]
    EmptyAddress,
}

/// Failure to load the recipient list. Always fatal for a run.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("Recipient source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recipient source HTTP error: {0}")]
    Http(String),

    #[error("Recipient source parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single failed delivery attempt, classified by the transport.
#[derive(Debug, Clone, Error)]
#[error("{kind} delivery failure: {detail}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub detail: String,
}

impl TransportError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            detail: detail.into(),
        }
    }
}

/// Final failure for one recipient, after the retry policy gave up.
#[derive(Debug, Clone, Error)]
#[error("send failed after {attempts} attempt(s): {source}")]
pub struct SendError {
    pub kind: FailureKind,
    pub attempts: u32,
    #[source]
    pub source: TransportError,
}

/// Errors that abort a dispatch run.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::permanent("550 mailbox unavailable");
        assert_eq!(
            err.to_string(),
            "permanent delivery failure: 550 mailbox unavailable"
        );
    }

    #[test]
    fn test_send_error_display_includes_attempts() {
        let err = SendError {
            kind: FailureKind::Transient,
            attempts: 3,
            source: TransportError::transient("timeout"),
        };
        assert_eq!(
            err.to_string(),
            "send failed after 3 attempt(s): transient delivery failure: timeout"
        );
    }

    #[test]
    fn test_dispatch_error_from_data_source() {
        let err: DispatchError = DataSourceError::Http("503".to_string()).into();
        assert!(matches!(err, DispatchError::DataSource(_)));
        assert_eq!(err.to_string(), "Recipient source HTTP error: 503");
    }
}

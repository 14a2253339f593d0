//! Service desk client errors and their mapping to API error kinds.

use common::ErrorKind;
use thiserror::Error;

/// Errors returned by the service desk client.
#[derive(Debug, Error)]
pub enum ServiceDeskError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service desk returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A success response carried a body that is neither a JSON object nor an array.
    #[error("failed to decode service desk response: {0}")]
    Decode(String),

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Every attempt failed with a retryable error.
    #[error("request failed after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<ServiceDeskError>,
    },

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A decoded response lacked a field the caller depends on.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ServiceDeskError {
    /// Transport failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceDeskError::Transport(_) => true,
            ServiceDeskError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true for a 4xx other than 429: the service understood the
    /// request and rejected it.
    pub fn is_client_rejection(&self) -> bool {
        matches!(
            self,
            ServiceDeskError::Status { status, .. } if (400..500).contains(status) && *status != 429
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceDeskError::Cancelled)
    }

    /// Classifies the error for the API layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceDeskError::Cancelled => ErrorKind::Internal,
            ServiceDeskError::InvalidRequest(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::ExternalServiceError,
        }
    }
}

/// Result type for service desk operations.
pub type Result<T> = std::result::Result<T, ServiceDeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ServiceDeskError {
        ServiceDeskError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_retry_classification() {
        assert!(ServiceDeskError::Transport("reset".into()).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());

        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!ServiceDeskError::Decode("eof".into()).is_retryable());
        assert!(!ServiceDeskError::Cancelled.is_retryable());
    }

    #[test]
    fn test_client_rejection() {
        assert!(status(404).is_client_rejection());
        assert!(status(422).is_client_rejection());
        assert!(!status(429).is_client_rejection());
        assert!(!status(502).is_client_rejection());
    }

    #[test]
    fn test_kind() {
        assert_eq!(ServiceDeskError::Cancelled.kind(), ErrorKind::Internal);
        assert_eq!(status(503).kind(), ErrorKind::ExternalServiceError);
        let exhausted = ServiceDeskError::RetryExhausted {
            attempts: 3,
            last: Box::new(status(503)),
        };
        assert_eq!(exhausted.kind(), ErrorKind::ExternalServiceError);
        assert!(exhausted.to_string().contains("after 3 attempts"));
    }
}

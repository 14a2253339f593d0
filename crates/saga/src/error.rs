//! Saga error types.

use common::ErrorKind;
use service_desk::ServiceDeskError;
use thiserror::Error;

/// Errors a saga reports to its caller.
///
/// A failed compensation never gets its own variant unless it leaves the
/// caller with two causes to report; otherwise it is appended to the
/// original message.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    /// The external service failed or answered with something unusable.
    #[error("{message}: {source}")]
    External {
        message: String,
        #[source]
        source: ServiceDeskError,
    },

    #[error("{0}")]
    Internal(String),

    /// The local write failed and undoing the remote write failed too.
    #[error("{message} (original error: {original}; compensation error: {compensation})")]
    CompensationFailed {
        message: String,
        original: String,
        compensation: String,
    },

    /// The caller's cancellation token fired during a remote call.
    #[error("saga cancelled during {step}")]
    Cancelled { step: &'static str },
}

impl SagaError {
    pub(crate) fn external(message: impl Into<String>, source: ServiceDeskError) -> Self {
        SagaError::External {
            message: message.into(),
            source,
        }
    }

    /// Classifies the error for the API layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::InvalidInput(_) => ErrorKind::InvalidInput,
            SagaError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            SagaError::NotFound(_) => ErrorKind::NotFound,
            SagaError::External { .. } => ErrorKind::ExternalServiceError,
            SagaError::Internal(_)
            | SagaError::CompensationFailed { .. }
            | SagaError::Cancelled { .. } => ErrorKind::Internal,
        }
    }
}

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compensation_failure_carries_both_causes() {
        let err = SagaError::CompensationFailed {
            message: "failed to create user".to_string(),
            original: "store unavailable".to_string(),
            compensation: "status 500".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("store unavailable"));
        assert!(text.contains("status 500"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_external_includes_service_message() {
        let err = SagaError::external(
            "failed to create ticket in external service",
            ServiceDeskError::Status {
                status: 400,
                body: "category is required".to_string(),
            },
        );
        assert!(err.to_string().contains("category is required"));
        assert_eq!(err.kind(), ErrorKind::ExternalServiceError);
    }
}

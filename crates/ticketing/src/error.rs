//! Ticketing error types.

use common::ErrorKind;
use service_desk::ServiceDeskError;
use thiserror::Error;

/// Errors that can occur during ticketing operations.
#[derive(Debug, Error)]
pub enum TicketingError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    /// The service desk failed; `message` names the operation.
    #[error("{message}: {source}")]
    External {
        message: String,
        #[source]
        source: ServiceDeskError,
    },

    #[error("{0}")]
    Internal(String),

    #[error("request cancelled")]
    Cancelled,
}

impl TicketingError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TicketingError::InvalidInput(message.into())
    }

    /// Wraps a service desk failure, keeping cancellation distinct.
    pub(crate) fn remote(message: impl Into<String>, source: ServiceDeskError) -> Self {
        if source.is_cancelled() {
            return TicketingError::Cancelled;
        }
        TicketingError::External {
            message: message.into(),
            source,
        }
    }

    /// Classifies the error for the API layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketingError::InvalidInput(_) => ErrorKind::InvalidInput,
            TicketingError::NotFound(_) => ErrorKind::NotFound,
            TicketingError::External { .. } => ErrorKind::ExternalServiceError,
            TicketingError::Internal(_) | TicketingError::Cancelled => ErrorKind::Internal,
        }
    }
}

/// Result type for ticketing operations.
pub type Result<T> = std::result::Result<T, TicketingError>;

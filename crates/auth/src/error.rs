//! Authentication errors.

use common::ErrorKind;
use store::StoreError;
use thiserror::Error;

/// Errors from token handling and the auth service.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Classifies the error for the API layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidInput(_) => ErrorKind::InvalidInput,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::Unauthorized(_) => ErrorKind::Unauthorized,
            AuthError::Internal(_) => ErrorKind::Internal,
            AuthError::Store(e) => e.kind(),
        }
    }
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

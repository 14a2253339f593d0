//! Error taxonomy shared across crates.

use serde::{Deserialize, Serialize};

/// Coarse classification every component reports its failures through.
///
/// Each crate keeps its own error enum; this is the common denominator the
/// HTTP layer maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    Forbidden,
    Internal,
    ExternalServiceError,
    AlreadyExists,
    InvalidCredentials,
}

impl ErrorKind {
    /// Stable machine-readable code sent to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL_ERROR",
            ErrorKind::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            ErrorKind::AlreadyExists => "EMAIL_ALREADY_EXIST",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ErrorKind::AlreadyExists.code(), "EMAIL_ALREADY_EXIST");
        assert_eq!(ErrorKind::ExternalServiceError.code(), "EXTERNAL_SERVICE_ERROR");
        assert_eq!(ErrorKind::Internal.to_string(), "INTERNAL_ERROR");
    }
}

//! API error types with HTTP response mapping.

use auth::AuthError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use saga::SagaError;
use ticketing::TicketingError;

/// API-level error type that maps to HTTP responses.
///
/// Every error body has the shape
/// `{"success": false, "error": <message>, "code": <ErrorKind code>}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request the handler rejected before calling a service.
    BadRequest(String),
    /// Missing or malformed credentials.
    Unauthorized(String),
    Auth(AuthError),
    Saga(SagaError),
    Ticketing(TicketingError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::InvalidInput,
            ApiError::Unauthorized(_) => ErrorKind::Unauthorized,
            ApiError::Auth(err) => err.kind(),
            ApiError::Saga(err) => err.kind(),
            ApiError::Ticketing(err) => err.kind(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) => f.write_str(msg),
            ApiError::Auth(err) => write!(f, "{err}"),
            ApiError::Saga(err) => write!(f, "{err}"),
            ApiError::Ticketing(err) => write!(f, "{err}"),
        }
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized | ErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::ExternalServiceError => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let message = self.to_string();

        match kind {
            ErrorKind::Internal => tracing::error!(error = %message, "internal server error"),
            ErrorKind::ExternalServiceError => {
                tracing::warn!(error = %message, "service desk error")
            }
            _ => tracing::debug!(error = %message, code = kind.code(), "request rejected"),
        }

        metrics::counter!("http_errors_total", "code" => kind.code()).increment(1);

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "code": kind.code(),
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<TicketingError> for ApiError {
    fn from(err: TicketingError) -> Self {
        ApiError::Ticketing(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected JSON body");
        ApiError::bad_request("invalid JSON body")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(format!("invalid query string: {}", rejection.body_text()))
    }
}

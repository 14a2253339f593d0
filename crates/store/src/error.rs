use common::ErrorKind;
use thiserror::Error;

/// Errors that can occur when interacting with the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    ///
    /// For identities this is the registration race: another request
    /// persisted the same email between the uniqueness check and the insert.
    #[error("duplicate key violation on field '{field}' with value '{value}'")]
    DuplicateKey { field: &'static str, value: String },

    /// A stored row could not be mapped back into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The store is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for unique-constraint violations.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    /// Classifies the error for the API layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::DuplicateKey { .. } => ErrorKind::AlreadyExists,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

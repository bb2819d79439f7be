use thiserror::Error;

/// Storage-specific error types for the GymTap token store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Request rejected before touching the database
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token exists but belongs to another member
    #[error("Mismatch: {0}")]
    Mismatch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn token_not_found(value: &gymtap_core::TokenValue) -> Self {
        Self::NotFound {
            entity_type: "Token".to_string(),
            field: "value".to_string(),
            value: value.redacted(),
        }
    }

    /// Whether this is a UNIQUE constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<StorageError> for gymtap_core::Error {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { .. } => Self::NotFound(error.to_string()),
            StorageError::Validation(msg) => Self::InvalidInput(msg),
            StorageError::Mismatch(msg) => Self::Mismatch(msg),
            StorageError::Configuration(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

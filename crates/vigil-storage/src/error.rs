use sea_orm::{DbErr, SqlErr};

/// Errors that can occur within the storage layer.
///
/// `NotFound` and `AlreadyExists` describe the data; every other variant is
/// an infrastructure failure the caller may retry.
///
/// # Examples
///
/// ```rust
/// use vigil_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "device",
///     id: "dev-99".to_string(),
/// };
/// assert!(err.to_string().contains("device"));
/// assert!(!err.is_infrastructure());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the caller's org.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An insert collided with an existing primary key or unique column.
    #[error("Storage: {entity} already exists (id={id})")]
    AlreadyExists { entity: &'static str, id: String },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] DbErr),

    /// JSON serialization or deserialization failure (tag columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column held a value outside its enumerated set.
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidColumn { column: &'static str, value: String },

    /// Filesystem error while preparing the data directory.
    #[error("Storage: IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for failures that say nothing about the data itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, StorageError::Database(_) | StorageError::Io(_))
    }

    /// Maps an insert error, turning unique-constraint violations into
    /// [`StorageError::AlreadyExists`].
    pub(crate) fn from_insert(entity: &'static str, id: &str, err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::AlreadyExists {
                entity,
                id: id.to_string(),
            },
            _ => StorageError::Database(err),
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

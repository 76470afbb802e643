use thiserror::Error;

/// Store-specific error types.
///
/// Policy outcomes are not errors: a scan that resolves to no student or
/// fails a permission check produces a denied [`Decision`], never a
/// `StoreError`. These variants cover genuine persistence failures only.
///
/// [`Decision`]: tessera_core::Decision
#[derive(Debug, Error)]
pub enum StoreError {
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

    /// A stored row failed to parse back into a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

//! Error types for the xavyo-ca-db crate.
//!
//! Provides a unified error type that wraps `SQLx` errors and lets callers
//! tell a lookup miss or a uniqueness conflict apart from any other failure.

use thiserror::Error;

/// Result alias for store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Database operation errors.
///
/// # Example
///
/// ```rust
/// use xavyo_ca_db::DbError;
///
/// fn handle_error(err: DbError) {
///     match err {
///         DbError::NotFound(what) => eprintln!("Missing: {}", what),
///         DbError::Conflict(what) => eprintln!("Duplicate: {}", what),
///         other => eprintln!("Store failure: {}", other),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key: {0}")]
    Conflict(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl DbError {
    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// Check if this error indicates a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Check if this error indicates a uniqueness violation.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict(_))
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        DbError::NotFound(what.into())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound("no rows returned".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => DbError::Conflict(
                db_err
                    .constraint()
                    .map_or_else(|| db_err.message().to_string(), ToString::to_string),
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::ConnectionFailed(err)
            }
            other => DbError::QueryFailed(other),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

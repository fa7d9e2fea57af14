//! Error types for podium-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// `UniqueViolation` is the store telling a writer it lost a race on a
/// uniqueness constraint. Callers that implement get-or-create treat it as a
/// control-flow signal, everything else is a persistence failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("unique constraint violated on {table}: {key}")]
    UniqueViolation { table: String, key: String },

    #[error("{table} record not found: {key}")]
    NotFound { table: String, key: String },

    #[error("invalid {table} record: {reason}")]
    InvalidRecord { table: String, reason: String },

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this error is a lost race on a uniqueness constraint.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::UniqueViolation { .. })
    }

    pub(crate) fn unique(table: &str, key: impl Into<String>) -> Self {
        StorageError::UniqueViolation {
            table: table.to_string(),
            key: key.into(),
        }
    }

    pub(crate) fn not_found(table: &str, key: impl Into<String>) -> Self {
        StorageError::NotFound {
            table: table.to_string(),
            key: key.into(),
        }
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

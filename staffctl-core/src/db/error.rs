//! Data-access error type
//!
//! Every repository and executor operation returns `DbError`. "Already exists"
//! and "not found" are explicit variants so callers can match on them.

use super::schema::SchemaError;

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{resource} '{id}' already exists")]
    Duplicate { resource: &'static str, id: String },

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("entity type {entity} has no registered schema")]
    Unmapped { entity: &'static str },

    #[error("mapping error: {0}")]
    Mapping(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl DbError {
    /// Whether retrying the whole unit of work may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlx(e) => is_transient_sqlx(e),
            _ => false,
        }
    }

    /// Report a statement cancelled by the server-side `statement_timeout`
    /// as `Timeout`, passing other errors through.
    pub(crate) fn or_timeout(self, seconds: u64) -> Self {
        if self.is_statement_timeout() {
            Self::Timeout { seconds }
        } else {
            self
        }
    }

    fn is_statement_timeout(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(db)) => db
                .code()
                .map(|code| is_statement_timeout_sqlstate(&code))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Build a `Duplicate` from a storage unique violation, passing other errors through.
    pub(crate) fn from_write(e: sqlx::Error, resource: &'static str, id: &str) -> Self {
        let unique = e
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            Self::Duplicate {
                resource,
                id: id.to_owned(),
            }
        } else {
            Self::Sqlx(e)
        }
    }
}

fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_transient_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    }
}

/// SQLSTATE codes that indicate a connection fault or a conflict the server
/// expects the client to retry.
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")
        || matches!(
            code,
            "40001" | "40P01" | "53300" | "57P01" | "57P02" | "57P03"
        )
}

/// `query_canceled`, raised when `statement_timeout` expires.
pub fn is_statement_timeout_sqlstate(code: &str) -> bool {
    code == "57014"
}

//! Errors returned by the staff logic service.
//!
//! Lookup and uniqueness failures are lifted out of `DbError` so callers can
//! map them without reaching into the data-access layer.

use thiserror::Error;

use crate::db::DbError;
use crate::models::ValidationError;

/// Main error type for staff operations
#[derive(Error, Debug)]
pub enum StaffError {
    /// Request failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A staff record with this id already exists
    #[error("Staff with id '{id}' already exists")]
    Duplicate { id: String },

    /// No staff record with this id
    #[error("Staff with id '{id}' not found")]
    NotFound { id: String },

    /// Any other data-access failure
    #[error(transparent)]
    Database(DbError),
}

impl From<DbError> for StaffError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate { id, .. } => Self::Duplicate { id },
            DbError::NotFound { id, .. } => Self::NotFound { id },
            other => Self::Database(other),
        }
    }
}

/// Convenience Result type for staff operations
pub type Result<T> = std::result::Result<T, StaffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifts_lookup_errors() {
        let err: StaffError = DbError::NotFound {
            resource: "Staff",
            id: "ST001".into(),
        }
        .into();
        assert!(matches!(err, StaffError::NotFound { ref id } if id == "ST001"));
        assert_eq!(err.to_string(), "Staff with id 'ST001' not found");

        let err: StaffError = DbError::Duplicate {
            resource: "Staff",
            id: "ST001".into(),
        }
        .into();
        assert!(matches!(err, StaffError::Duplicate { .. }));
    }

    #[test]
    fn other_errors_stay_database_errors() {
        let err: StaffError = DbError::Timeout { seconds: 600 }.into();
        assert!(matches!(err, StaffError::Database(DbError::Timeout { .. })));
    }
}

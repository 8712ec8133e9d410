//! Staff identifier validation
//!
//! Up to 8 characters of ASCII letters, digits, hyphens and underscores;
//! matches the `staff_id VARCHAR(8)` key column.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

/// Maximum length for staff identifiers
pub const MAX_STAFF_ID_LEN: usize = 8;

static STAFF_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("invalid staff id regex"));

/// Validated staff identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaffId(String);

impl StaffId {
    /// Create a staff id. Surrounding whitespace is ignored.
    ///
    /// # Example
    /// ```
    /// use staffctl_core::models::StaffId;
    ///
    /// assert!(StaffId::new("ST001").is_ok());
    /// assert!(StaffId::new("ST 001").is_err());  // space
    /// assert!(StaffId::new("TOOLONG01").is_err());  // 9 chars
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "staff id" });
        }

        if s.chars().count() > MAX_STAFF_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "staff id",
                max: MAX_STAFF_ID_LEN,
            });
        }

        if !STAFF_ID_RE.is_match(s) {
            return Err(ValidationError::InvalidFormat {
                field: "staff id",
                reason: "must contain only letters, digits, hyphens and underscores",
            });
        }

        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for StaffId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

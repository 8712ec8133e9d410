//! Staff full name validation

use super::ValidationError;

/// Maximum length for full names, in characters
pub const MAX_FULL_NAME_LEN: usize = 100;

/// Validated, trimmed full name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullName(String);

impl FullName {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "full name" });
        }

        if s.chars().count() > MAX_FULL_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "full name",
                max: MAX_FULL_NAME_LEN,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(FullName::new("  Jane Doe ").unwrap().as_str(), "Jane Doe");
    }

    #[test]
    fn rejects_blank() {
        let err = FullName::new(" \t").unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 100 two-byte characters fit
        assert!(FullName::new(&"é".repeat(100)).is_ok());
        let err = FullName::new(&"é".repeat(101)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 100, .. }));
    }
}

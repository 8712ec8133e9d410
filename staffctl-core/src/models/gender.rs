//! Gender codes as stored in the `gender` column

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Gender {
    Male = 1,
    Female = 2,
}

impl Gender {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable label.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

impl TryFrom<i32> for Gender {
    type Error = ValidationError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Male),
            2 => Ok(Self::Female),
            other => Err(ValidationError::InvalidVariant {
                field: "gender",
                value: other.to_string(),
            }),
        }
    }
}

impl From<Gender> for i32 {
    fn from(g: Gender) -> Self {
        g.code()
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(Gender::try_from(1).unwrap(), Gender::Male);
        assert_eq!(Gender::try_from(2).unwrap(), Gender::Female);
        assert_eq!(Gender::Female.code(), 2);
        assert_eq!(Gender::Male.to_string(), "Male");
    }

    #[test]
    fn rejects_unknown_codes() {
        let err = Gender::try_from(3).unwrap_err();
        assert_eq!(err.to_string(), "invalid gender value: '3'");
        assert!(Gender::try_from(0).is_err());
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&Gender::Female).unwrap(), "2");
        let g: Gender = serde_json::from_str("1").unwrap();
        assert_eq!(g, Gender::Male);
        assert!(serde_json::from_str::<Gender>("9").is_err());
    }
}

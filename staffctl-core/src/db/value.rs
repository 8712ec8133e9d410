//! Typed column values
//!
//! Entities hand their persisted fields to the repository as `ColumnValue`s,
//! which keeps SQL generation independent of the concrete entity type.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Postgres, QueryBuilder};

/// A single bindable column value. `None` binds a typed SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Bool(Option<bool>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
}

impl ColumnValue {
    /// Push this value as a bind parameter.
    pub fn push_bind(self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::Text(v) => qb.push_bind(v),
            Self::Int(v) => qb.push_bind(v),
            Self::BigInt(v) => qb.push_bind(v),
            Self::Bool(v) => qb.push_bind(v),
            Self::Date(v) => qb.push_bind(v),
            Self::Timestamp(v) => qb.push_bind(v),
        };
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Text(v) => v.is_none(),
            Self::Int(v) => v.is_none(),
            Self::BigInt(v) => v.is_none(),
            Self::Bool(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
        }
    }
}

macro_rules! column_value_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for ColumnValue {
            fn from(v: $ty) -> Self {
                Self::$variant(Some(v))
            }
        }

        impl From<Option<$ty>> for ColumnValue {
            fn from(v: Option<$ty>) -> Self {
                Self::$variant(v)
            }
        }
    };
}

column_value_from!(Text, String);
column_value_from!(Int, i32);
column_value_from!(BigInt, i64);
column_value_from!(Bool, bool);
column_value_from!(Date, NaiveDate);
column_value_from!(Timestamp, NaiveDateTime);

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        Self::Text(Some(v.to_owned()))
    }
}

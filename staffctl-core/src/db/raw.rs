//! Raw scalar queries
//!
//! Escape hatch for SQL the repository cannot express. The statement text is
//! sent as-is with no parameter binding, so it must never contain untrusted
//! input.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::database::{statement_timeout_sql, Database};
use super::DbError;

/// First column of the first row of a raw query.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(serde_json::Value),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl ScalarValue {
    /// Textual form, as the server would print it.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Json(v) => v.to_string(),
            Self::Date(v) => v.format("%Y-%m-%d").to_string(),
            Self::Timestamp(v) => v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }
}

impl Database {
    /// Run `sql` and return the first column of the first row, or `None`
    /// when there are no rows or the value is NULL.
    ///
    /// `timeout_secs > 0` bounds the statement on the server side.
    pub async fn execute_scalar(
        &self,
        sql: &str,
        timeout_secs: u64,
    ) -> Result<Option<ScalarValue>, DbError> {
        debug!(timeout_secs, "executing raw scalar query");

        let mut tx = self.primary().begin().await?;
        if timeout_secs > 0 {
            let stmt = statement_timeout_sql(std::time::Duration::from_secs(timeout_secs));
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }

        let row = sqlx::query(sql)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| match timeout_secs {
                0 => DbError::from(e),
                secs => DbError::from(e).or_timeout(secs),
            })?;
        tx.commit().await?;

        match row {
            Some(row) => decode_first_column(&row),
            None => Ok(None),
        }
    }

    /// Run `sql` and parse the scalar result into `T`.
    ///
    /// A NULL result or a value that does not parse as `T` yields
    /// `T::default()`.
    pub async fn execute_typed<T>(&self, sql: &str, timeout_secs: u64) -> Result<T, DbError>
    where
        T: DeserializeOwned + Default,
    {
        let value = self.execute_scalar(sql, timeout_secs).await?;
        Ok(parse_scalar(value))
    }
}

/// Convert a scalar into `T`, falling back to `T::default()`.
///
/// JSON values deserialize directly. Other values are parsed from their
/// textual form as JSON first, then as a bare JSON string.
pub fn parse_scalar<T>(value: Option<ScalarValue>) -> T
where
    T: DeserializeOwned + Default,
{
    let parsed = match value {
        None => None,
        Some(ScalarValue::Json(json)) => serde_json::from_value(json).ok(),
        Some(other) => {
            let text = other.to_text();
            serde_json::from_str(&text)
                .ok()
                .or_else(|| serde_json::from_value(serde_json::Value::String(text)).ok())
        }
    };
    parsed.unwrap_or_default()
}

fn decode_first_column(row: &PgRow) -> Result<Option<ScalarValue>, DbError> {
    if row.columns().is_empty() {
        return Ok(None);
    }
    if row.try_get_raw(0)?.is_null() {
        return Ok(None);
    }

    let type_name = row.column(0).type_info().name();
    let value = match type_name {
        "BOOL" => ScalarValue::Bool(row.try_get(0)?),
        "INT2" => ScalarValue::Int(row.try_get::<i16, _>(0)?.into()),
        "INT4" => ScalarValue::Int(row.try_get::<i32, _>(0)?.into()),
        "INT8" => ScalarValue::Int(row.try_get(0)?),
        "FLOAT4" => ScalarValue::Float(row.try_get::<f32, _>(0)?.into()),
        "FLOAT8" => ScalarValue::Float(row.try_get(0)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ScalarValue::Text(row.try_get(0)?),
        "UUID" => ScalarValue::Text(row.try_get::<uuid::Uuid, _>(0)?.to_string()),
        "JSON" | "JSONB" => ScalarValue::Json(row.try_get(0)?),
        "DATE" => ScalarValue::Date(row.try_get(0)?),
        "TIMESTAMP" => ScalarValue::Timestamp(row.try_get(0)?),
        "TIMESTAMPTZ" => ScalarValue::Timestamp(row.try_get::<DateTime<Utc>, _>(0)?.naive_utc()),
        other => {
            return Err(DbError::Mapping(format!(
                "unsupported scalar type {}; cast the column to text",
                other
            )))
        }
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::pool;
    use crate::db::schema::SchemaModel;

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    struct Summary {
        total: i64,
        names: Vec<String>,
    }

    #[test]
    fn text_forms() {
        assert_eq!(ScalarValue::Int(42).to_text(), "42");
        assert_eq!(ScalarValue::Bool(true).to_text(), "true");
        assert_eq!(
            ScalarValue::Date(NaiveDate::from_ymd_opt(1990, 5, 1).unwrap()).to_text(),
            "1990-05-01"
        );
    }

    #[test]
    fn parses_numbers_and_strings() {
        assert_eq!(parse_scalar::<i64>(Some(ScalarValue::Int(7))), 7);
        assert_eq!(parse_scalar::<String>(Some(ScalarValue::Text("abc".into()))), "abc");
        assert_eq!(parse_scalar::<f64>(Some(ScalarValue::Text("1.5".into()))), 1.5);
    }

    #[test]
    fn parses_json_into_struct() {
        let json = serde_json::json!({ "total": 2, "names": ["a", "b"] });
        let summary: Summary = parse_scalar(Some(ScalarValue::Json(json)));
        assert_eq!(
            summary,
            Summary {
                total: 2,
                names: vec!["a".into(), "b".into()]
            }
        );

        let summary: Summary =
            parse_scalar(Some(ScalarValue::Text(r#"{"total":1,"names":[]}"#.into())));
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn null_and_garbage_give_default() {
        assert_eq!(parse_scalar::<i64>(None), 0);
        assert_eq!(parse_scalar::<i64>(Some(ScalarValue::Text("nope".into()))), 0);
        assert_eq!(
            parse_scalar::<Summary>(Some(ScalarValue::Text("[1,2]".into()))),
            Summary::default()
        );
    }

    async fn test_db() -> Database {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = pool::create_pool(&url).await.expect("pool creation failed");
        Database::from_pool(pool, Arc::new(SchemaModel::new()))
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn statement_timeout_is_reported_as_timeout() {
        let db = test_db().await;
        let err = db.execute_scalar("SELECT pg_sleep(3)", 1).await.unwrap_err();
        assert!(matches!(err, DbError::Timeout { seconds: 1 }));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn scalar_queries() {
        let db = test_db().await;

        assert_eq!(
            db.execute_scalar("SELECT 40 + 2", 0).await.unwrap(),
            Some(ScalarValue::Int(42))
        );
        assert_eq!(db.execute_scalar("SELECT NULL::int", 5).await.unwrap(), None);
        assert_eq!(
            db.execute_scalar("SELECT 1 WHERE false", 0).await.unwrap(),
            None
        );

        let n: i64 = db.execute_typed("SELECT COUNT(*) FROM pg_class", 0).await.unwrap();
        assert!(n > 0);

        let summary: Summary = db
            .execute_typed(r#"SELECT '{"total":3,"names":["x"]}'::jsonb"#, 0)
            .await
            .unwrap();
        assert_eq!(summary.total, 3);
    }
}

//! Staff entity and its table mapping

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::FromRow;

use crate::db::{ColumnType, ColumnValue, Entity, EntityConfiguration, EntityTypeBuilder};

/// Staff record as stored in the `staff` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Staff {
    #[sqlx(rename = "staff_id")]
    pub id: String,
    pub full_name: String,
    pub birthday: NaiveDate,
    /// Gender code, see `Gender`
    pub gender: i32,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_by: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl Staff {
    /// Unsaved record; audit fields are filled in by the repository.
    pub fn new(id: String, full_name: String, birthday: NaiveDate, gender: i32) -> Self {
        Self {
            id,
            full_name,
            birthday,
            gender,
            created_by: None,
            created_at: NaiveDateTime::default(),
            updated_by: None,
            updated_at: NaiveDateTime::default(),
        }
    }
}

impl Entity for Staff {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn values(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("id", self.id.clone().into()),
            ("full_name", self.full_name.clone().into()),
            ("birthday", self.birthday.into()),
            ("gender", self.gender.into()),
            ("created_by", self.created_by.clone().into()),
            ("created_at", self.created_at.into()),
            ("updated_by", self.updated_by.clone().into()),
            ("updated_at", self.updated_at.into()),
        ]
    }

    fn stamp_created(&mut self, by: &str, at: NaiveDateTime) {
        self.created_by = Some(by.to_owned());
        self.created_at = at;
    }

    fn stamp_updated(&mut self, by: &str, at: NaiveDateTime) {
        self.updated_by = Some(by.to_owned());
        self.updated_at = at;
    }
}

/// Mapping for `Staff`
pub struct StaffConfig;

impl EntityConfiguration for StaffConfig {
    type Entity = Staff;

    fn configure(&self, b: &mut EntityTypeBuilder) {
        b.to_table("staff").has_key("id");
        b.property("id").column("staff_id").max_length(8);
        b.property("full_name").required().max_length(100);
        b.property("birthday").required().column_type(ColumnType::Date);
        b.property("gender").required().column_type(ColumnType::Integer);
        b.property("created_by").max_length(100).created_by();
        b.property("created_at")
            .required()
            .column_type(ColumnType::Timestamp)
            .created_at();
        b.property("updated_by").max_length(100).updated_by();
        b.property("updated_at")
            .required()
            .column_type(ColumnType::Timestamp)
            .updated_at();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnRole, SchemaModel};

    fn descriptor() -> std::sync::Arc<crate::db::SchemaDescriptor> {
        let mut model = SchemaModel::new();
        model.apply(&StaffConfig).unwrap();
        model.descriptor::<Staff>().unwrap()
    }

    #[test]
    fn staff_table_ddl() {
        assert_eq!(
            descriptor().create_table_sql(),
            "CREATE TABLE IF NOT EXISTS staff (\n    \
             staff_id VARCHAR(8) NOT NULL,\n    \
             full_name VARCHAR(100) NOT NULL,\n    \
             birthday DATE NOT NULL,\n    \
             gender INTEGER NOT NULL,\n    \
             created_by VARCHAR(100),\n    \
             created_at TIMESTAMP NOT NULL,\n    \
             updated_by VARCHAR(100),\n    \
             updated_at TIMESTAMP NOT NULL,\n    \
             PRIMARY KEY (staff_id)\n)"
        );
    }

    #[test]
    fn staff_is_hard_deleted() {
        let d = descriptor();
        assert!(d.active_column().is_none());
        assert_eq!(d.column_for("created_by").unwrap().role, ColumnRole::CreatedBy);
        assert_eq!(d.column_for("updated_at").unwrap().role, ColumnRole::UpdatedAt);
    }

    #[test]
    fn values_cover_every_mapped_field() {
        let d = descriptor();
        let staff = Staff::new(
            "ST001".into(),
            "Jane Doe".into(),
            NaiveDate::from_ymd_opt(1990, 5, 1).unwrap(),
            2,
        );
        let fields: Vec<_> = staff.values().into_iter().map(|(f, _)| f).collect();
        let mapped: Vec<_> = d.columns().iter().map(|c| c.field).collect();
        assert_eq!(fields, mapped);
    }

    #[test]
    fn stamping() {
        let mut staff = Staff::new(
            "ST001".into(),
            "Jane Doe".into(),
            NaiveDate::from_ymd_opt(1990, 5, 1).unwrap(),
            2,
        );
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        staff.stamp_created("admin", at);
        staff.stamp_updated("-", at);
        assert_eq!(staff.created_by.as_deref(), Some("admin"));
        assert_eq!(staff.updated_by.as_deref(), Some("-"));
        assert_eq!(staff.created_at, at);
    }
}

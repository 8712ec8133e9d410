//! Lazy, composable read queries
//!
//! A `Select` only records filters and ordering. SQL is rendered and executed
//! when one of the `fetch_*` / `count` methods runs, against whatever
//! executor the caller supplies (pool, replica pool or open transaction).

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::{PgExecutor, Postgres, QueryBuilder};

use super::entity::Entity;
use super::schema::SchemaDescriptor;
use super::value::ColumnValue;
use super::DbError;

/// Comparison operator for a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Case-sensitive substring match (`LIKE '%value%'`).
    Contains,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Ne => " <> ",
            Self::Lt => " < ",
            Self::Le => " <= ",
            Self::Gt => " > ",
            Self::Ge => " >= ",
            Self::Contains => " LIKE ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
struct Filter {
    field: String,
    op: Op,
    value: ColumnValue,
}

/// Deferred `SELECT` over one entity type.
#[derive(Debug)]
pub struct Select<T> {
    descriptor: Arc<SchemaDescriptor>,
    active_only: bool,
    filters: Vec<Filter>,
    order: Vec<(String, Order)>,
    limit: Option<i64>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Select<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            active_only: self.active_only,
            filters: self.filters.clone(),
            order: self.order.clone(),
            limit: self.limit,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Select<T> {
    pub(crate) fn new(descriptor: Arc<SchemaDescriptor>, active_only: bool) -> Self {
        Self {
            descriptor,
            active_only,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            _entity: PhantomData,
        }
    }

    /// Add a filter on an entity field. Unknown fields are reported when the
    /// query runs.
    pub fn filter(mut self, field: &str, op: Op, value: impl Into<ColumnValue>) -> Self {
        self.filters.push(Filter {
            field: field.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order.push((field.to_owned(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the query without running it.
    pub fn to_query_builder(&self) -> Result<QueryBuilder<'static, Postgres>, DbError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(self.descriptor.column_list());
        qb.push(" FROM ");
        qb.push(self.descriptor.table());
        self.push_where(&mut qb)?;

        if !self.order.is_empty() {
            qb.push(" ORDER BY ");
            for (i, (field, order)) in self.order.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(self.column(field)?);
                qb.push(match order {
                    Order::Asc => " ASC",
                    Order::Desc => " DESC",
                });
            }
        }

        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        Ok(qb)
    }

    pub async fn fetch_all<'e, E>(self, executor: E) -> Result<Vec<T>, DbError>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = self.to_query_builder()?;
        let rows = qb.build_query_as::<T>().fetch_all(executor).await?;
        Ok(rows)
    }

    pub async fn fetch_optional<'e, E>(self, executor: E) -> Result<Option<T>, DbError>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = self.limit(1).to_query_builder()?;
        let row = qb.build_query_as::<T>().fetch_optional(executor).await?;
        Ok(row)
    }

    pub async fn count<'e, E>(self, executor: E) -> Result<i64, DbError>
    where
        E: PgExecutor<'e>,
    {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
        qb.push(self.descriptor.table());
        self.push_where(&mut qb)?;
        let (count,): (i64,) = qb.build_query_as().fetch_one(executor).await?;
        Ok(count)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) -> Result<(), DbError> {
        let mut first = true;
        let mut next = |qb: &mut QueryBuilder<'static, Postgres>| {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        if self.active_only {
            if let Some(active) = self.descriptor.active_column() {
                next(qb);
                qb.push(active.column);
                qb.push(" = TRUE");
            }
        }

        for f in &self.filters {
            let column = self.column(&f.field)?;
            next(qb);
            qb.push(column);
            qb.push(f.op.as_sql());
            match (f.op, &f.value) {
                (Op::Contains, ColumnValue::Text(Some(text))) => {
                    qb.push_bind(format!("%{}%", escape_like(text)));
                    qb.push(" ESCAPE '\\'");
                }
                (Op::Contains, _) => {
                    return Err(DbError::Mapping(format!(
                        "substring filter on '{}' needs a text value",
                        f.field
                    )));
                }
                (_, value) => value.clone().push_bind(qb),
            }
        }

        Ok(())
    }

    fn column(&self, field: &str) -> Result<&'static str, DbError> {
        self.descriptor
            .column_for(field)
            .map(|c| c.column)
            .ok_or_else(|| {
                DbError::Mapping(format!(
                    "{} has no mapped field '{}'",
                    self.descriptor.entity(),
                    field
                ))
            })
    }
}

/// Escape `LIKE` wildcards so user input matches literally.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{ColumnType, EntityConfiguration, EntityTypeBuilder, SchemaModel};

    #[derive(Debug, Clone, sqlx::FromRow)]
    struct Note {
        id: String,
    }

    impl Entity for Note {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }

        fn values(&self) -> Vec<(&'static str, ColumnValue)> {
            vec![("id", self.id.clone().into())]
        }
    }

    struct NoteConfig {
        soft: bool,
    }

    impl EntityConfiguration for NoteConfig {
        type Entity = Note;

        fn configure(&self, b: &mut EntityTypeBuilder) {
            b.to_table("notes").has_key("id");
            b.property("id").column("note_id");
            b.property("body").column("body_text");
            b.property("rank").column("rank").column_type(ColumnType::Integer);
            if self.soft {
                b.property("active").column("is_active").active_flag();
            }
        }
    }

    fn descriptor(soft: bool) -> Arc<SchemaDescriptor> {
        let mut model = SchemaModel::new();
        model.apply(&NoteConfig { soft }).unwrap();
        model.descriptor::<Note>().unwrap()
    }

    #[test]
    fn plain_select() {
        let q = Select::<Note>::new(descriptor(false), true);
        assert_eq!(
            q.to_query_builder().unwrap().sql(),
            "SELECT note_id, body_text, rank FROM notes"
        );
    }

    #[test]
    fn active_filter_only_for_soft_delete_entities() {
        let q = Select::<Note>::new(descriptor(true), true);
        assert_eq!(
            q.to_query_builder().unwrap().sql(),
            "SELECT note_id, body_text, rank, is_active FROM notes WHERE is_active = TRUE"
        );

        let q = Select::<Note>::new(descriptor(true), false);
        assert_eq!(
            q.to_query_builder().unwrap().sql(),
            "SELECT note_id, body_text, rank, is_active FROM notes"
        );
    }

    #[test]
    fn filters_order_and_limit() {
        let q = Select::<Note>::new(descriptor(true), true)
            .filter("body", Op::Contains, "abc")
            .filter("rank", Op::Ge, 3)
            .order_by("id", Order::Asc)
            .order_by("rank", Order::Desc)
            .limit(10);

        assert_eq!(
            q.to_query_builder().unwrap().sql(),
            "SELECT note_id, body_text, rank, is_active FROM notes \
             WHERE is_active = TRUE AND body_text LIKE $1 ESCAPE '\\' AND rank >= $2 \
             ORDER BY note_id ASC, rank DESC LIMIT $3"
        );
    }

    #[test]
    fn unknown_field_is_mapping_error() {
        let q = Select::<Note>::new(descriptor(false), true).filter("nope", Op::Eq, 1);
        assert!(matches!(q.to_query_builder(), Err(DbError::Mapping(_))));

        let q = Select::<Note>::new(descriptor(false), true).order_by("nope", Order::Asc);
        assert!(matches!(q.to_query_builder(), Err(DbError::Mapping(_))));
    }

    #[test]
    fn contains_requires_text() {
        let q = Select::<Note>::new(descriptor(false), true).filter("rank", Op::Contains, 1);
        assert!(matches!(q.to_query_builder(), Err(DbError::Mapping(_))));
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn composition_does_not_mutate_original() {
        let base = Select::<Note>::new(descriptor(false), true);
        let narrowed = base.clone().filter("id", Op::Eq, "n1");
        assert_eq!(
            base.to_query_builder().unwrap().sql(),
            "SELECT note_id, body_text, rank FROM notes"
        );
        assert!(narrowed.to_query_builder().unwrap().sql().ends_with("WHERE note_id = $1"));
    }
}

//! Entity capability traits

use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::FromRow;

use super::value::ColumnValue;

/// A record type persisted in one table.
///
/// The table layout lives in the entity's `EntityConfiguration`; the entity
/// itself only knows how to expose its identifier and field values.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Clone + Send + Sync + Unpin + 'static {
    /// Current identifier. Empty means "not yet persisted".
    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Persisted fields as `(field name, value)` pairs.
    ///
    /// Field names must match the `property` names declared in the
    /// configuration; the repository maps them to columns.
    fn values(&self) -> Vec<(&'static str, ColumnValue)>;

    /// Record who created the entity and when. No-op for entities without
    /// creation audit fields.
    fn stamp_created(&mut self, _by: &str, _at: NaiveDateTime) {}

    /// Record who last modified the entity and when.
    fn stamp_updated(&mut self, _by: &str, _at: NaiveDateTime) {}

    /// Soft-delete access for entities whose configuration declares an
    /// active flag.
    fn soft_deletable(&mut self) -> Option<&mut dyn SoftDeletable> {
        None
    }
}

/// Entities that are removed by clearing an active flag instead of deleting
/// the row.
pub trait SoftDeletable {
    fn is_active(&self) -> bool;

    fn set_active(&mut self, active: bool);
}

/// Short type name used in logs and error messages.
pub(crate) fn entity_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

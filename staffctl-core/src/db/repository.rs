//! Generic entity repository
//!
//! `Repository<T, U>` gives every mapped entity type the same CRUD surface:
//! lazy queries, audit stamping on write, soft delete for entity types whose
//! mapping declares an active flag, and a pluggable uniqueness check `U`.
//!
//! Writes take an open `PgConnection`, normally the one handed out by
//! `Database::run_in_transaction`, so several repository calls can share one
//! transaction.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, PgExecutor, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::entity::{entity_name, Entity};
use super::query::{Op, Select};
use super::schema::{ColumnDef, ColumnRole, SchemaDescriptor};
use super::value::ColumnValue;
use super::{Database, DbError};
use crate::context::CallerContext;

/// Decides whether an entity clashes with stored rows.
///
/// `query` selects every row of the entity's table, including soft-deleted
/// ones; rules narrow it with their own filters.
#[async_trait]
pub trait UniquenessRule<T: Entity>: Send + Sync {
    /// Identifier of a stored row that conflicts with `entity`, if any.
    async fn find_conflict(
        &self,
        conn: &mut PgConnection,
        query: Select<T>,
        entity: &T,
    ) -> Result<Option<String>, DbError>;
}

/// No uniqueness check beyond the storage constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUniqueness;

#[async_trait]
impl<T: Entity> UniquenessRule<T> for NoUniqueness {
    async fn find_conflict(
        &self,
        _conn: &mut PgConnection,
        _query: Select<T>,
        _entity: &T,
    ) -> Result<Option<String>, DbError> {
        Ok(None)
    }
}

/// Conflict when a row with the same key exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyUniqueness;

#[async_trait]
impl<T: Entity> UniquenessRule<T> for KeyUniqueness {
    async fn find_conflict(
        &self,
        conn: &mut PgConnection,
        query: Select<T>,
        entity: &T,
    ) -> Result<Option<String>, DbError> {
        if entity.id().is_empty() {
            return Ok(None);
        }
        let key = query.descriptor().key().field;
        let found = query
            .filter(key, Op::Eq, entity.id())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.map(|row| row.id().to_owned()))
    }
}

/// Whether a full-row update writes the active flag. Only soft removal does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveColumn {
    Keep,
    Write,
}

/// CRUD over one entity type.
pub struct Repository<T, U = NoUniqueness> {
    descriptor: Arc<SchemaDescriptor>,
    caller: CallerContext,
    has_active_flag: bool,
    uniqueness: U,
    _entity: PhantomData<fn() -> T>,
}

impl<T, U: Clone> Clone for Repository<T, U> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            caller: self.caller.clone(),
            has_active_flag: self.has_active_flag,
            uniqueness: self.uniqueness.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T, U> std::fmt::Debug for Repository<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &self.descriptor.entity())
            .field("table", &self.descriptor.table())
            .field("has_active_flag", &self.has_active_flag)
            .finish()
    }
}

impl<T: Entity, U: UniquenessRule<T>> Repository<T, U> {
    /// Bind a repository to `T`'s mapping.
    ///
    /// # Errors
    ///
    /// `DbError::Unmapped` when no configuration for `T` was applied.
    pub fn new(db: &Database, caller: CallerContext, uniqueness: U) -> Result<Self, DbError> {
        let descriptor = db
            .schema()
            .descriptor::<T>()
            .ok_or(DbError::Unmapped {
                entity: entity_name::<T>(),
            })?;
        let has_active_flag = descriptor.active_column().is_some();

        Ok(Self {
            descriptor,
            caller,
            has_active_flag,
            uniqueness,
            _entity: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    /// Whether removal clears the active flag instead of deleting.
    pub fn has_active_flag(&self) -> bool {
        self.has_active_flag
    }

    /// Active rows. Nothing runs until the query is fetched.
    pub fn all(&self) -> Select<T> {
        Select::new(Arc::clone(&self.descriptor), true)
    }

    /// Every row, including soft-deleted ones.
    pub fn all_with_inactive(&self) -> Select<T> {
        Select::new(Arc::clone(&self.descriptor), false)
    }

    /// Look up by identifier, regardless of the active flag.
    pub async fn find_by_id<'e, E>(&self, executor: E, id: &str) -> Result<Option<T>, DbError>
    where
        E: PgExecutor<'e>,
    {
        if id.is_empty() {
            return Ok(None);
        }
        self.all_with_inactive()
            .filter(self.descriptor.key().field, Op::Eq, id)
            .fetch_optional(executor)
            .await
    }

    /// Whether the uniqueness rule finds a stored row clashing with `entity`.
    pub async fn exists(&self, conn: &mut PgConnection, entity: &T) -> Result<bool, DbError> {
        let conflict = self
            .uniqueness
            .find_conflict(conn, self.all_with_inactive(), entity)
            .await?;
        Ok(conflict.is_some())
    }

    /// Insert `entity`, returning the stored row.
    ///
    /// Assigns a fresh identifier when the entity has none, stamps the
    /// creation (and update) audit fields and marks soft-deletable entities
    /// active.
    pub async fn add(&self, conn: &mut PgConnection, mut entity: T) -> Result<T, DbError> {
        if let Some(existing) = self
            .uniqueness
            .find_conflict(&mut *conn, self.all_with_inactive(), &entity)
            .await?
        {
            return Err(self.duplicate(existing));
        }

        if entity.id().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        }

        let by = self.caller.audit_name().to_owned();
        let now = self.caller.clock().now();
        entity.stamp_created(&by, now);
        entity.stamp_updated(&by, now);
        self.set_active(&mut entity, true)?;

        let id = entity.id().to_owned();
        let values = self.column_values(&entity)?;

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(self.descriptor.table());
        qb.push(" (");
        qb.push(self.descriptor.column_list());
        qb.push(") VALUES (");
        for (i, (_, value)) in values.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            value.push_bind(&mut qb);
        }
        qb.push(") RETURNING ");
        qb.push(self.descriptor.column_list());

        let stored = qb
            .build_query_as::<T>()
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| DbError::from_write(e, self.descriptor.entity(), &id))?;

        debug!(entity = self.descriptor.entity(), id = %id, "entity added");
        Ok(stored)
    }

    /// Overwrite the stored row with `entity`, returning the stored row.
    ///
    /// Creation audit columns and the active flag keep their stored values.
    pub async fn update(&self, conn: &mut PgConnection, mut entity: T) -> Result<T, DbError> {
        if let Some(existing) = self
            .uniqueness
            .find_conflict(&mut *conn, self.all_with_inactive(), &entity)
            .await?
        {
            if existing != entity.id() {
                return Err(self.duplicate(existing));
            }
        }

        let by = self.caller.audit_name().to_owned();
        entity.stamp_updated(&by, self.caller.clock().now());

        let stored = self.write_update(conn, &entity, ActiveColumn::Keep).await?;
        debug!(entity = self.descriptor.entity(), id = %stored.id(), "entity updated");
        Ok(stored)
    }

    /// Update when a row with the entity's identifier exists, insert otherwise.
    pub async fn add_or_update(&self, conn: &mut PgConnection, entity: T) -> Result<T, DbError> {
        let exists = self.find_by_id(&mut *conn, entity.id()).await?.is_some();
        if exists {
            self.update(conn, entity).await
        } else {
            self.add(conn, entity).await
        }
    }

    /// Remove the row with identifier `id`.
    ///
    /// # Errors
    ///
    /// `DbError::NotFound` when no such row exists.
    pub async fn remove_by_id(&self, conn: &mut PgConnection, id: &str) -> Result<T, DbError> {
        match self.find_by_id(&mut *conn, id).await? {
            Some(entity) => self.remove(conn, entity).await,
            None => Err(self.not_found(id)),
        }
    }

    /// Soft-delete `entity` when its type has an active flag, delete the row
    /// otherwise.
    pub async fn remove(&self, conn: &mut PgConnection, mut entity: T) -> Result<T, DbError> {
        if self.has_active_flag {
            self.set_active(&mut entity, false)?;
            let by = self.caller.audit_name().to_owned();
            entity.stamp_updated(&by, self.caller.clock().now());
            let stored = self.write_update(conn, &entity, ActiveColumn::Write).await?;
            debug!(entity = self.descriptor.entity(), id = %stored.id(), "entity deactivated");
            return Ok(stored);
        }

        let key = self.descriptor.key();
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(self.descriptor.table());
        qb.push(" WHERE ");
        qb.push(key.column);
        qb.push(" = ");
        qb.push_bind(entity.id().to_owned());

        let result = qb.build().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found(entity.id()));
        }

        debug!(entity = self.descriptor.entity(), id = %entity.id(), "entity deleted");
        Ok(entity)
    }

    /// Run the statement built by `update_statement`, returning the stored row.
    async fn write_update(
        &self,
        conn: &mut PgConnection,
        entity: &T,
        active: ActiveColumn,
    ) -> Result<T, DbError> {
        let mut qb = self.update_statement(entity, active)?;
        qb.build_query_as::<T>()
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| DbError::from_write(e, self.descriptor.entity(), entity.id()))?
            .ok_or_else(|| self.not_found(entity.id()))
    }

    /// Full-row `UPDATE` of every column except the key and creation audit
    /// columns. The active flag is only written when `active` says so.
    fn update_statement(
        &self,
        entity: &T,
        active: ActiveColumn,
    ) -> Result<QueryBuilder<'static, Postgres>, DbError> {
        let key = self.descriptor.key();
        let values = self.column_values(entity)?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(self.descriptor.table());
        qb.push(" SET ");

        let mut first = true;
        for (def, value) in values {
            if def.role == ColumnRole::Key || def.role.is_creation_audit() {
                continue;
            }
            if def.role == ColumnRole::Active && active == ActiveColumn::Keep {
                continue;
            }
            if !first {
                qb.push(", ");
            }
            first = false;
            qb.push(def.column);
            qb.push(" = ");
            value.push_bind(&mut qb);
        }
        if first {
            // Key-only mapping: keep the statement valid so a missing row is still detected.
            qb.push(key.column);
            qb.push(" = ");
            qb.push(key.column);
        }

        qb.push(" WHERE ");
        qb.push(key.column);
        qb.push(" = ");
        qb.push_bind(entity.id().to_owned());
        qb.push(" RETURNING ");
        qb.push(self.descriptor.column_list());
        Ok(qb)
    }

    /// Pair each mapped column with the entity's value for it, in
    /// declaration order.
    fn column_values<'d>(&'d self, entity: &T) -> Result<Vec<(&'d ColumnDef, ColumnValue)>, DbError> {
        let mut provided = entity.values();

        if let Some((field, _)) = provided
            .iter()
            .find(|(field, _)| self.descriptor.column_for(field).is_none())
        {
            return Err(DbError::Mapping(format!(
                "{} field '{}' is not mapped",
                self.descriptor.entity(),
                field
            )));
        }

        self.descriptor
            .columns()
            .iter()
            .map(|def| {
                let pos = provided
                    .iter()
                    .position(|(field, _)| *field == def.field)
                    .ok_or_else(|| {
                        DbError::Mapping(format!(
                            "{} does not provide a value for '{}'",
                            self.descriptor.entity(),
                            def.field
                        ))
                    })?;
                let (_, value) = provided.swap_remove(pos);
                if def.required && value.is_null() {
                    return Err(DbError::Mapping(format!(
                        "{} field '{}' is required",
                        self.descriptor.entity(),
                        def.field
                    )));
                }
                Ok((def, value))
            })
            .collect()
    }

    fn set_active(&self, entity: &mut T, active: bool) -> Result<(), DbError> {
        if !self.has_active_flag {
            return Ok(());
        }
        match entity.soft_deletable() {
            Some(flag) => {
                flag.set_active(active);
                Ok(())
            }
            None => Err(DbError::Mapping(format!(
                "{} maps an active flag but is not soft-deletable",
                self.descriptor.entity()
            ))),
        }
    }

    fn duplicate(&self, id: String) -> DbError {
        DbError::Duplicate {
            resource: self.descriptor.entity(),
            id,
        }
    }

    fn not_found(&self, id: &str) -> DbError {
        DbError::NotFound {
            resource: self.descriptor.entity(),
            id: id.to_owned(),
        }
    }
}

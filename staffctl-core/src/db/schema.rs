//! Declarative entity-to-table mapping
//!
//! Each entity type has an `EntityConfiguration` that declares its table,
//! key and columns through `EntityTypeBuilder`. At startup the configurations
//! listed by the registry are applied to a `SchemaModel`, which is then
//! frozen behind an `Arc` and shared read-only by every repository.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::entity::{entity_name, Entity};

/// Explicit storage type for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    VarChar(u32),
    Char(u32),
    Integer,
    BigInt,
    Boolean,
    Date,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "TEXT"),
            Self::VarChar(n) => write!(f, "VARCHAR({})", n),
            Self::Char(n) => write!(f, "CHAR({})", n),
            Self::Integer => write!(f, "INTEGER"),
            Self::BigInt => write!(f, "BIGINT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// What the repository does with a column beyond storing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Plain,
    Key,
    CreatedBy,
    CreatedAt,
    UpdatedBy,
    UpdatedAt,
    Active,
}

impl ColumnRole {
    /// Creation audit columns are written once, on insert.
    pub fn is_creation_audit(self) -> bool {
        matches!(self, Self::CreatedBy | Self::CreatedAt)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Key => "key",
            Self::CreatedBy => "created_by",
            Self::CreatedAt => "created_at",
            Self::UpdatedBy => "updated_by",
            Self::UpdatedAt => "updated_at",
            Self::Active => "active",
        }
    }
}

/// Mapping of one entity field to one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub field: &'static str,
    pub column: &'static str,
    pub required: bool,
    pub column_type: Option<ColumnType>,
    pub role: ColumnRole,
}

/// Immutable table mapping for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    entity: &'static str,
    table: &'static str,
    columns: Vec<ColumnDef>,
}

impl SchemaDescriptor {
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// The key column. `build()` guarantees exactly one.
    pub fn key(&self) -> &ColumnDef {
        self.columns
            .iter()
            .find(|c| c.role == ColumnRole::Key)
            .unwrap_or(&self.columns[0])
    }

    pub fn active_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.role == ColumnRole::Active)
    }

    pub fn column_for(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Comma-separated column list in declaration order.
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.column)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for this mapping. Columns without
    /// an explicit type are stored as `TEXT`.
    pub fn create_table_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let ty = c.column_type.unwrap_or(ColumnType::Text);
                if c.required {
                    format!("{} {} NOT NULL", c.column, ty)
                } else {
                    format!("{} {}", c.column, ty)
                }
            })
            .collect();
        lines.push(format!("PRIMARY KEY ({})", self.key().column));

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            lines.join(",\n    ")
        )
    }

    fn same_layout(&self, other: &Self) -> bool {
        self.table == other.table && self.columns == other.columns
    }
}

/// Schema configuration errors. These surface at startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("{entity}: no table name configured")]
    MissingTable { entity: &'static str },

    #[error("{entity}: no key configured")]
    MissingKey { entity: &'static str },

    #[error("{entity}: key '{field}' is not a configured property")]
    UnknownKey {
        entity: &'static str,
        field: &'static str,
    },

    #[error("{entity}: column '{column}' is mapped more than once")]
    DuplicateColumn {
        entity: &'static str,
        column: &'static str,
    },

    #[error("{entity}: more than one {role} column")]
    DuplicateRole {
        entity: &'static str,
        role: &'static str,
    },

    #[error("conflicting mappings for table '{table}': {reason}")]
    Conflict { table: &'static str, reason: String },
}

/// Builder handed to `EntityConfiguration::configure`.
#[derive(Debug)]
pub struct EntityTypeBuilder {
    entity: &'static str,
    table: Option<&'static str>,
    key: Option<&'static str>,
    columns: Vec<ColumnDef>,
}

impl EntityTypeBuilder {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            table: None,
            key: None,
            columns: Vec::new(),
        }
    }

    pub fn to_table(&mut self, table: &'static str) -> &mut Self {
        self.table = Some(table);
        self
    }

    pub fn has_key(&mut self, field: &'static str) -> &mut Self {
        self.key = Some(field);
        self
    }

    /// Configure a persisted field. The column name defaults to the field
    /// name; calling `property` again for the same field refines the same
    /// mapping.
    pub fn property(&mut self, field: &'static str) -> PropertyBuilder<'_> {
        let idx = match self.columns.iter().position(|c| c.field == field) {
            Some(idx) => idx,
            None => {
                self.columns.push(ColumnDef {
                    field,
                    column: field,
                    required: false,
                    column_type: None,
                    role: ColumnRole::Plain,
                });
                self.columns.len() - 1
            }
        };
        PropertyBuilder {
            def: &mut self.columns[idx],
        }
    }

    pub fn build(mut self) -> Result<SchemaDescriptor, SchemaError> {
        let entity = self.entity;
        let table = self.table.ok_or(SchemaError::MissingTable { entity })?;
        let key = self.key.ok_or(SchemaError::MissingKey { entity })?;

        let key_def = self
            .columns
            .iter_mut()
            .find(|c| c.field == key)
            .ok_or(SchemaError::UnknownKey { entity, field: key })?;
        key_def.role = ColumnRole::Key;
        key_def.required = true;

        let mut seen = BTreeSet::new();
        for c in &self.columns {
            if !seen.insert(c.column) {
                return Err(SchemaError::DuplicateColumn {
                    entity,
                    column: c.column,
                });
            }
        }

        for role in [
            ColumnRole::CreatedBy,
            ColumnRole::CreatedAt,
            ColumnRole::UpdatedBy,
            ColumnRole::UpdatedAt,
            ColumnRole::Active,
        ] {
            if self.columns.iter().filter(|c| c.role == role).count() > 1 {
                return Err(SchemaError::DuplicateRole {
                    entity,
                    role: role.as_str(),
                });
            }
        }

        Ok(SchemaDescriptor {
            entity,
            table,
            columns: self.columns,
        })
    }
}

/// Fluent configuration of a single property.
pub struct PropertyBuilder<'a> {
    def: &'a mut ColumnDef,
}

impl PropertyBuilder<'_> {
    pub fn column(self, name: &'static str) -> Self {
        self.def.column = name;
        self
    }

    pub fn required(self) -> Self {
        self.def.required = true;
        self
    }

    pub fn column_type(self, ty: ColumnType) -> Self {
        self.def.column_type = Some(ty);
        self
    }

    /// Shorthand for `column_type(ColumnType::VarChar(len))`.
    pub fn max_length(self, len: u32) -> Self {
        self.column_type(ColumnType::VarChar(len))
    }

    pub fn created_by(self) -> Self {
        self.role(ColumnRole::CreatedBy)
    }

    pub fn created_at(self) -> Self {
        self.role(ColumnRole::CreatedAt)
    }

    pub fn updated_by(self) -> Self {
        self.role(ColumnRole::UpdatedBy)
    }

    pub fn updated_at(self) -> Self {
        self.role(ColumnRole::UpdatedAt)
    }

    /// Mark this column as the soft-delete flag.
    pub fn active_flag(self) -> Self {
        self.role(ColumnRole::Active)
    }

    fn role(self, role: ColumnRole) -> Self {
        self.def.role = role;
        self
    }
}

/// Declarative mapping for one entity type.
pub trait EntityConfiguration: Send + Sync {
    type Entity: Entity;

    fn configure(&self, builder: &mut EntityTypeBuilder);
}

/// Object-safe form of `EntityConfiguration`, so the registry can hold
/// configurations for different entity types in one list.
pub trait ApplyConfiguration: Send + Sync {
    fn apply(&self, model: &mut SchemaModel) -> Result<(), SchemaError>;
}

impl<C: EntityConfiguration> ApplyConfiguration for C {
    fn apply(&self, model: &mut SchemaModel) -> Result<(), SchemaError> {
        model.apply(self)
    }
}

/// All entity mappings plus opaque database extension flags.
#[derive(Debug, Default)]
pub struct SchemaModel {
    descriptors: HashMap<TypeId, Arc<SchemaDescriptor>>,
    extensions: BTreeSet<String>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register the mapping declared by `config`.
    ///
    /// Registering an identical mapping again is a no-op.
    pub fn apply<C>(&mut self, config: &C) -> Result<(), SchemaError>
    where
        C: EntityConfiguration + ?Sized,
    {
        let mut builder = EntityTypeBuilder::new(entity_name::<C::Entity>());
        config.configure(&mut builder);
        let descriptor = builder.build()?;
        let type_id = TypeId::of::<C::Entity>();

        if let Some(existing) = self.descriptors.get(&type_id) {
            if **existing == descriptor {
                return Ok(());
            }
            return Err(SchemaError::Conflict {
                table: descriptor.table,
                reason: format!("{} configured twice with different mappings", descriptor.entity),
            });
        }

        if let Some(other) = self
            .descriptors
            .values()
            .find(|d| d.table == descriptor.table && !d.same_layout(&descriptor))
        {
            return Err(SchemaError::Conflict {
                table: descriptor.table,
                reason: format!(
                    "{} and {} declare different columns",
                    other.entity, descriptor.entity
                ),
            });
        }

        tracing::debug!(entity = descriptor.entity, table = descriptor.table, "entity mapping registered");
        self.descriptors.insert(type_id, Arc::new(descriptor));
        Ok(())
    }

    pub fn descriptor<T: 'static>(&self) -> Option<Arc<SchemaDescriptor>> {
        self.descriptors.get(&TypeId::of::<T>()).cloned()
    }

    /// All descriptors ordered by table name.
    pub fn descriptors(&self) -> Vec<Arc<SchemaDescriptor>> {
        let mut all: Vec<_> = self.descriptors.values().cloned().collect();
        all.sort_by_key(|d| d.table);
        all
    }

    pub fn enable_extension(&mut self, name: &str) -> &mut Self {
        self.extensions.insert(name.to_owned());
        self
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

/// Apply every configuration in `configurations` to `model`.
pub fn apply_all(
    model: &mut SchemaModel,
    configurations: &[Box<dyn ApplyConfiguration>],
) -> Result<(), SchemaError> {
    for config in configurations {
        config.apply(model)?;
    }
    Ok(())
}

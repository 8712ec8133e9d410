//! Data-access layer - entity mapping, transactions and repositories
//!
//! # Design Principles
//!
//! - One mapping per entity type, built at startup and shared read-only
//! - Every write runs inside `Database::run_in_transaction`
//! - Storage constraints are authoritative; unique violations surface as `DbError::Duplicate`
//! - Soft delete is a property of the mapping, not of the caller

pub mod database;
pub mod entity;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod query;
pub mod raw;
pub mod repository;
pub mod retry;
pub mod schema;
pub mod value;

pub use database::Database;
pub use entity::{Entity, SoftDeletable};
pub use error::DbError;
pub use query::{Op, Order, Select};
pub use raw::ScalarValue;
pub use repository::{KeyUniqueness, NoUniqueness, Repository, UniquenessRule};
pub use retry::RetryPolicy;
pub use schema::{
    apply_all, ApplyConfiguration, ColumnDef, ColumnRole, ColumnType, EntityConfiguration,
    EntityTypeBuilder, SchemaDescriptor, SchemaError, SchemaModel,
};
pub use value::ColumnValue;

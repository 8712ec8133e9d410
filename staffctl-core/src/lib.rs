//! staffctl-core: transactional data access and staff logic
//!
//! - `db`: entity mapping, retrying transaction executor, generic repository
//!   and raw scalar queries over PostgreSQL
//! - `models`: validated staff fields and the `Staff` entity mapping
//! - `logic`: staff CRUD and search on top of the repository
//! - `context`: caller identity and shared services for audit stamping

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logic;
pub mod models;

pub use config::AppConfig;
pub use context::{CallerContext, Clock, ServiceRegistry};
pub use db::{Database, DbError};
pub use error::{Result, StaffError};
pub use logic::StaffLogic;

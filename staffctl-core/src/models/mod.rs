//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod full_name;
pub mod gender;
pub mod staff;
pub mod staff_id;
pub mod validation;

pub use full_name::FullName;
pub use gender::Gender;
pub use staff::{Staff, StaffConfig};
pub use staff_id::StaffId;
pub use validation::ValidationError;

use crate::db::{apply_all, ApplyConfiguration, SchemaError, SchemaModel};

/// Every entity mapping in the application.
///
/// New entity types are registered here; nothing is discovered at runtime.
pub fn entity_configurations() -> Vec<Box<dyn ApplyConfiguration>> {
    vec![Box::new(StaffConfig)]
}

/// Database extensions the deployment expects (enabled when available).
pub const EXTENSIONS: &[&str] = &["pg_stat_statements", "pldbgapi"];

/// Build the application's schema model.
pub fn schema_model() -> Result<SchemaModel, SchemaError> {
    let mut model = SchemaModel::new();
    apply_all(&mut model, &entity_configurations())?;
    for ext in EXTENSIONS {
        model.enable_extension(ext);
    }
    Ok(model)
}

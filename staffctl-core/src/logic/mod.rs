//! Application services built on the repository layer

pub mod staff;

pub use staff::{
    age_on, CreateStaffRequest, StaffLogic, StaffResponse, StaffSearchQuery, UpdateStaffRequest,
};

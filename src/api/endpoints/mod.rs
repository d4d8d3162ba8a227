//! API endpoint handlers, one module per resource.

pub mod alerts;
pub mod health;
pub mod residents;
pub mod vitals;

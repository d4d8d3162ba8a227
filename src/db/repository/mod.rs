//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, so callers decide the
//! transaction boundary (the duplicate check in `monitoring::dedup` wraps
//! a lookup and an insert in one).

mod alert;
mod resident;
mod threshold;
mod vital_sign;

pub use alert::*;
pub use resident::*;
pub use threshold::*;
pub use vital_sign::*;

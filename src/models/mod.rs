pub mod alert;
pub mod enums;
pub mod resident;
pub mod threshold;
pub mod vital_sign;

pub use alert::*;
pub use enums::*;
pub use resident::*;
pub use threshold::*;
pub use vital_sign::*;

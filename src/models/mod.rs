pub mod record;
pub mod reminder;
pub mod session;
pub mod triage;
pub mod vital_sign;

pub use record::*;
pub use reminder::*;
pub use session::*;
pub use triage::*;
pub use vital_sign::*;

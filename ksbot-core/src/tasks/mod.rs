pub mod discovery;
pub mod auto_check;

pub use discovery::check_new_codes;
pub use auto_check::{AutoCheckStatus, AutoCheckTask};

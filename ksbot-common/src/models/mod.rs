// File: ksbot-common/src/models/mod.rs
pub mod ids;
pub mod outcome;
pub mod result_entry;

pub use ids::{Code, PlayerId};
pub use outcome::Outcome;
pub use result_entry::ResultEntry;

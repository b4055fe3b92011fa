// File: ksbot-common/src/lib.rs

pub mod error;
pub mod models;
pub mod traits;

pub use error::Error;
pub use models::{Code, Outcome, PlayerId, ResultEntry};

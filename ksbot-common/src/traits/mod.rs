pub mod session_traits;
pub mod source_traits;
pub mod notify_traits;

pub use session_traits::{SessionDriver, SessionEngine};
pub use source_traits::{CodeSource, PlayerSource};
pub use notify_traits::Notifier;

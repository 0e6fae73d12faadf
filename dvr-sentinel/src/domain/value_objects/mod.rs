//! Domain value objects.
//!
//! Value objects are immutable objects that represent concepts in the domain
//! and are defined by their attributes rather than identity.

mod report_mode;
mod retry_policy;
mod time_window;

pub use report_mode::ReportMode;
pub use retry_policy::RetryBackoff;
pub use time_window::{TimeWindow, WindowKey};

//! Window scheduling and report delivery.
//!
//! - [`window`]: day/night window arithmetic
//! - [`ticker`]: fixed-interval action runner with an overlap guard
//! - [`dispatcher`]: exactly-once report delivery per window
//! - [`retry`]: background retry of undelivered reports
//! - [`policy`]: forced arming per window
//! - [`planner`]: report-mode planning and the tick actions

pub mod dispatcher;
pub mod planner;
pub mod policy;
pub mod retry;
pub mod ticker;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{DispatchOutcome, ReportDispatcher};
pub use planner::{PolicyTickAction, ReportPlanner, ReportTickAction, RetryTickAction};
pub use policy::{ArmState, ArmingPolicy, PolicyDecision};
pub use retry::{RetrySummary, UnsentRetryWorker};
pub use ticker::{FnAction, PeriodicTicker, TickAction};
pub use window::{Period, TimeWindowCalculator};

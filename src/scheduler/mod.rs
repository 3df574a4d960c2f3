//! Foreground reminder scheduling.
//!
//! [`ForegroundScheduler`] owns the evaluation loop and the periodic handoff
//! to the background timer host; [`handoff`] builds the batches it sends.

pub mod handoff;
pub mod runner;

pub use handoff::{HandoffStatus, build_batch};
pub use runner::{FiredReminder, ForegroundScheduler, PassReport, SchedulerBuilder};

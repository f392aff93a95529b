//! Admission, supervision and cancellation of jobs.

pub mod cancel;
pub mod duplicate;
pub mod queue;
pub mod watchdog;
pub(crate) mod worker;

pub use cancel::CancelToken;
pub use duplicate::Decision;
pub use queue::JobQueue;
pub use watchdog::{Timeout, Watchdog};

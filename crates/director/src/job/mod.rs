//! Job records, their lifecycle, and the runners that execute them.

pub mod kinds;
pub mod name;
pub mod record;
pub mod registry;
pub mod runner;
pub mod status;
pub mod summary;

pub use name::{JobNamer, NAMES_PER_SECOND};
pub use record::{
    AgentLink, JobHandle, JobId, JobLevel, JobPayload, JobRecord, JobRequest, JobSnapshot,
    JobState, JobTiming, JobType,
};
pub use registry::JobRegistry;
pub use runner::{final_status, JobContext, JobFailure, JobKind, JobOutcome, JobRunner, Services};
pub use status::JobStatus;
pub use summary::JobSummary;

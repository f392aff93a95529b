//! Job status values and the transition rule between them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    WaitingOnResource,
    WaitingPriority,
    WaitingMaxJobs,
    WaitingStartTime,
    Running,
    Terminated,
    Warnings,
    ErrorTerminated,
    FatalError,
    Canceled,
}

impl JobStatus {
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            JobStatus::WaitingOnResource
                | JobStatus::WaitingPriority
                | JobStatus::WaitingMaxJobs
                | JobStatus::WaitingStartTime
        )
    }

    /// Created or any of the waiting states.
    pub fn is_queued(&self) -> bool {
        matches!(self, JobStatus::Created) || self.is_waiting()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Terminated
                | JobStatus::Warnings
                | JobStatus::ErrorTerminated
                | JobStatus::FatalError
                | JobStatus::Canceled
        )
    }

    /// Once reached, only an escalation to Canceled is still applied.
    pub fn is_absorbing(&self) -> bool {
        matches!(
            self,
            JobStatus::ErrorTerminated | JobStatus::FatalError | JobStatus::Canceled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Terminated | JobStatus::Warnings)
    }

    fn rank(&self) -> u8 {
        if self.is_absorbing() {
            20
        } else if self.is_terminal() {
            10
        } else {
            0
        }
    }

    /// Whether a job currently in `self` may move to `next`.
    ///
    /// Canceled accepts nothing and the failure states accept only Canceled.
    /// Completed states only accept an escalation to failure or cancellation.
    /// Everything else moves freely.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self.rank() {
            20 => *self != JobStatus::Canceled && next == JobStatus::Canceled,
            10 => next.rank() == 20,
            _ => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::WaitingOnResource => "waiting_on_resource",
            JobStatus::WaitingPriority => "waiting_priority",
            JobStatus::WaitingMaxJobs => "waiting_max_jobs",
            JobStatus::WaitingStartTime => "waiting_start_time",
            JobStatus::Running => "running",
            JobStatus::Terminated => "terminated",
            JobStatus::Warnings => "warnings",
            JobStatus::ErrorTerminated => "error_terminated",
            JobStatus::FatalError => "fatal_error",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            JobStatus::Created => "Created, not yet running",
            JobStatus::WaitingOnResource => "Waiting on storage resource",
            JobStatus::WaitingPriority => "Waiting for higher priority jobs to finish",
            JobStatus::WaitingMaxJobs => "Waiting on max jobs",
            JobStatus::WaitingStartTime => "Waiting for start time",
            JobStatus::Running => "Running",
            JobStatus::Terminated => "Terminated normally",
            JobStatus::Warnings => "Terminated with warnings",
            JobStatus::ErrorTerminated => "Terminated in error",
            JobStatus::FatalError => "Fatal error",
            JobStatus::Canceled => "Canceled",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorbing_states_only_accept_canceled() {
        for from in [JobStatus::Canceled, JobStatus::ErrorTerminated, JobStatus::FatalError] {
            assert!(!from.can_transition_to(JobStatus::Running));
            assert!(!from.can_transition_to(JobStatus::Terminated));
            assert!(!from.can_transition_to(JobStatus::Warnings));
        }
        assert!(!JobStatus::Canceled.can_transition_to(JobStatus::Canceled));
        assert!(!JobStatus::ErrorTerminated.can_transition_to(JobStatus::FatalError));
    }

    #[test]
    fn test_failure_states_escalate_to_canceled() {
        assert!(JobStatus::FatalError.can_transition_to(JobStatus::Canceled));
        assert!(JobStatus::ErrorTerminated.can_transition_to(JobStatus::Canceled));
    }

    #[test]
    fn test_completed_states_only_escalate() {
        assert!(JobStatus::Warnings.can_transition_to(JobStatus::Canceled));
        assert!(JobStatus::Terminated.can_transition_to(JobStatus::FatalError));
        assert!(!JobStatus::Terminated.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Warnings.can_transition_to(JobStatus::Terminated));
    }

    #[test]
    fn test_waiting_classification() {
        assert!(JobStatus::WaitingMaxJobs.is_waiting());
        assert!(JobStatus::Created.is_queued());
        assert!(!JobStatus::Created.is_waiting());
        assert!(!JobStatus::Running.is_queued());
    }
}

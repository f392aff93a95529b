//! Duplicate-job arbitration, evaluated under the queue lock at submission.

use chrono::{DateTime, Duration, Utc};

use crate::job::{JobHandle, JobId, JobLevel, JobRequest, JobType};

#[derive(Debug)]
pub enum Decision {
    /// The new job may proceed; these live duplicates must be canceled first.
    Allow { cancel: Vec<JobHandle> },
    /// The new job is refused in favour of `existing`.
    Reject { existing: JobId },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

fn backup_rank(level: JobLevel) -> Option<u8> {
    match level {
        JobLevel::Full => Some(3),
        JobLevel::Differential => Some(2),
        JobLevel::Incremental => Some(1),
        _ => None,
    }
}

/// Checks `request` against the live (waiting or running) jobs.
///
/// A consolidation is compared with other consolidations of the same client
/// and fileset regardless of any other setting, and always loses. Otherwise
/// jobs of the same definition name are duplicates unless the definition
/// allows them; lower-level preemption is evaluated before the queued and
/// running cancellation policies.
pub fn allow(request: &JobRequest, live: &[JobHandle], now: DateTime<Utc>) -> Decision {
    let policy = &request.definition.duplicates;
    if policy.ignore_duplicate_checking {
        return Decision::Allow { cancel: Vec::new() };
    }
    let live: Vec<&JobHandle> = live
        .iter()
        .filter(|j| !j.ignores_duplicates() && !j.status().is_terminal())
        .collect();

    if request.is_consolidation() {
        let clash = live.iter().find(|j| {
            j.is_consolidation()
                && j.client() == request.client.as_deref()
                && j.fileset() == request.fileset.as_deref()
        });
        if let Some(existing) = clash {
            log::info!(
                "Consolidation of {} already queued or running as JobId {}",
                request.definition.name,
                existing.id()
            );
            return Decision::Reject {
                existing: existing.id(),
            };
        }
    }

    if request.skip_duplicate_check || policy.allow_duplicate_jobs {
        return Decision::Allow { cancel: Vec::new() };
    }

    let proximity = Duration::seconds(policy.proximity_secs.min(i64::MAX as u64) as i64);
    let mut cancel = Vec::new();
    for existing in live {
        if existing.definition().name != request.definition.name {
            continue;
        }
        if policy.proximity_secs > 0 {
            let started = existing.lock().timing.started_at;
            if started.is_some_and(|t| now - t > proximity) {
                log::debug!(
                    "JobId {} started outside the duplicate proximity window",
                    existing.id()
                );
                continue;
            }
        }

        if policy.cancel_lower_level_duplicates
            && request.job_type == JobType::Backup
            && existing.job_type() == JobType::Backup
        {
            if let (Some(new), Some(old)) =
                (backup_rank(request.level), backup_rank(existing.level()))
            {
                if new > old {
                    log::info!(
                        "Canceling lower level duplicate JobId {} ({})",
                        existing.id(),
                        existing.level()
                    );
                    cancel.push(existing.clone());
                    continue;
                }
                if new < old {
                    log::info!(
                        "Higher level duplicate JobId {} ({}) is already live",
                        existing.id(),
                        existing.level()
                    );
                    return Decision::Reject {
                        existing: existing.id(),
                    };
                }
            }
        }

        if policy.cancel_queued_duplicates && existing.status().is_queued() {
            log::info!("Canceling queued duplicate JobId {}", existing.id());
            cancel.push(existing.clone());
            continue;
        }
        if policy.cancel_running_duplicates {
            log::info!("Canceling running duplicate JobId {}", existing.id());
            cancel.push(existing.clone());
            continue;
        }

        log::info!(
            "Duplicate of JobId {} ({}) is not allowed",
            existing.id(),
            existing.name()
        );
        return Decision::Reject {
            existing: existing.id(),
        };
    }
    Decision::Allow { cancel }
}

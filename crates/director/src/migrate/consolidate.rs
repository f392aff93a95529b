//! Always-incremental consolidation planning.

use chrono::{DateTime, Duration, Utc};

use crate::catalog::JobEntry;
use crate::config::AlwaysIncrementalConfig;
use crate::job::{JobId, JobLevel};

/// Caps how many consolidations per invocation may fold in a full backup.
#[derive(Debug, Clone)]
pub struct FullConsolidationBudget {
    limit: u32,
    used: u32,
}

impl FullConsolidationBudget {
    /// `limit` of 0 means unlimited.
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    pub fn available(&self) -> bool {
        self.limit == 0 || self.used < self.limit
    }

    fn take(&mut self) {
        self.used += 1;
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationPlan {
    /// Jobs to merge, oldest first.
    pub job_ids: Vec<JobId>,
    pub includes_full: bool,
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(i64::MAX as u64) as i64)
}

fn older_than(job: &JobEntry, cutoff: DateTime<Utc>) -> bool {
    job.ended_at.map(|t| t < cutoff).unwrap_or(false)
}

/// Decides what to consolidate from `chain`, a full backup followed by its
/// incrementals in ascending order. `None` when there is nothing to do.
pub fn plan(
    chain: &[JobEntry],
    settings: &AlwaysIncrementalConfig,
    now: DateTime<Utc>,
    budget: &mut FullConsolidationBudget,
) -> Option<ConsolidationPlan> {
    let (full, incrementals) = chain.split_first()?;
    if !matches!(full.level, JobLevel::Full | JobLevel::VirtualFull) {
        log::warn!("Job chain does not start with a full backup (JobId {})", full.job_id);
        return None;
    }

    let keep = settings.keep_number as usize;
    if incrementals.len() <= keep {
        log::info!(
            "{} incrementals, keeping {}: nothing to consolidate",
            incrementals.len(),
            keep
        );
        return None;
    }

    let retention_cutoff = now - secs(settings.job_retention_secs);
    let candidates: Vec<&JobEntry> = incrementals[..incrementals.len() - keep]
        .iter()
        .filter(|j| older_than(j, retention_cutoff))
        .collect();

    let full_due = match settings.max_full_age_secs {
        Some(age) => older_than(full, now - secs(age)),
        None => older_than(full, retention_cutoff),
    };
    let include_full = full_due && budget.available();
    if full_due && !include_full {
        log::info!(
            "Full consolidation limit reached, leaving JobId {} in place",
            full.job_id
        );
    }

    let mut job_ids = Vec::with_capacity(candidates.len() + 1);
    if include_full {
        job_ids.push(full.job_id);
    }
    job_ids.extend(candidates.iter().map(|j| j.job_id));

    if job_ids.len() < 2 {
        log::info!("Fewer than two jobs to consolidate, skipping");
        return None;
    }
    if include_full {
        budget.take();
    }
    Some(ConsolidationPlan {
        job_ids,
        includes_full: include_full,
    })
}

use std::sync::Arc;

use chrono::Utc;

use crate::job::record::{JobPayload, JobRequest, JobType};
use crate::job::runner::{JobContext, JobFailure, JobOutcome, JobRunner};
use crate::job::JobLevel;
use crate::migrate::{plan_consolidation, FullConsolidationBudget};

/// Control job that plans always-incremental consolidations and submits a
/// virtual full for each.
#[derive(Debug, Default)]
pub struct ConsolidateJob {
    submitted: usize,
}

impl JobRunner for ConsolidateJob {
    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let now = Utc::now();
        let mut budget = FullConsolidationBudget::new(ctx.job.definition().max_full_consolidations);
        let mut outcome = JobOutcome::default();

        let candidates = ctx.config().jobs.iter().filter(|d| {
            d.enabled && d.job_type == JobType::Backup && d.always_incremental.is_some()
        });
        for definition in candidates {
            ctx.checkpoint()?;
            let (Some(client), Some(fileset), Some(settings)) = (
                definition.client.as_deref(),
                definition.fileset.as_deref(),
                definition.always_incremental.as_ref(),
            ) else {
                log::debug!("Skipping {}: no client or fileset", definition.name);
                continue;
            };

            let _span = tracing::info_span!("consolidate.plan", job = %definition.name).entered();
            let chain = ctx.catalog().job_chain(&definition.name, client, fileset)?;
            let Some(plan) = plan_consolidation(&chain, settings, now, &mut budget) else {
                continue;
            };

            let ids: Vec<String> = plan.job_ids.iter().map(|id| id.to_string()).collect();
            let request = JobRequest::from_definition(Arc::new(definition.clone()))
                .with_level(JobLevel::VirtualFull)
                .with_payload(JobPayload::VirtualFull {
                    job_ids: plan.job_ids.clone(),
                });
            match ctx.queue.submit(request) {
                Ok(id) => {
                    self.submitted += 1;
                    ctx.job.add_message(format!(
                        "Consolidating JobIds {} of {} in JobId {}",
                        ids.join(","),
                        definition.name,
                        id
                    ));
                }
                Err(e) => {
                    ctx.job.add_message(format!(
                        "Could not start consolidation of {}: {}",
                        definition.name, e
                    ));
                    outcome.warnings += 1;
                }
            }
        }

        if self.submitted == 0 {
            ctx.job.add_message("Nothing to consolidate.");
        }
        Ok(outcome)
    }
}

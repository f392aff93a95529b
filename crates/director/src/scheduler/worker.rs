//! Per-job worker: catalog bookkeeping around a runner's `init`/`run`/`cleanup`.

use chrono::Utc;

use crate::catalog::{JobEndRecord, JobEntry};
use crate::job::{final_status, JobContext, JobFailure, JobOutcome, JobRunner, JobStatus};

fn catalog_entry(ctx: &JobContext) -> JobEntry {
    let job = &ctx.job;
    let state = job.lock();
    JobEntry {
        job_id: job.id(),
        name: job.definition().name.clone(),
        job_type: job.job_type(),
        level: job.level(),
        client: job.client().map(str::to_string),
        fileset: job.fileset().map(str::to_string),
        pool: job.pool().map(str::to_string),
        status: state.status,
        scheduled_at: Some(state.timing.scheduled_at),
        started_at: state.timing.started_at,
        ended_at: None,
        files: 0,
        bytes: 0,
        migrated: false,
    }
}

fn record_outcome(ctx: &JobContext, result: &Result<JobOutcome, JobFailure>) {
    match result {
        Ok(outcome) => {
            let mut state = ctx.job.lock();
            state.files += outcome.files;
            state.bytes += outcome.bytes;
            state.errors += outcome.errors;
            state.warnings += outcome.warnings;
            for volume in &outcome.volumes {
                if !state.volumes.contains(volume) {
                    state.volumes.push(volume.clone());
                }
            }
        }
        Err(failure) => {
            if failure.status != JobStatus::Canceled {
                ctx.job.lock().errors += 1;
            }
            ctx.job.add_message(failure.message.clone());
        }
    }
}

fn run_phases(ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
    let job = &ctx.job;
    let catalog = ctx.catalog();
    catalog.create_job_record(&catalog_entry(ctx))?;
    if let Some(started) = job.lock().timing.started_at {
        catalog.update_job_start_record(job.id(), started)?;
    }

    let mut kind = job
        .take_kind()
        .ok_or_else(|| JobFailure::fatal("Job was already run"))?;
    let result = kind.init(ctx).and_then(|_| {
        ctx.checkpoint()?;
        kind.run(ctx)
    });

    let status = final_status(job.cancel_token().is_cancelled(), &result);
    record_outcome(ctx, &result);
    job.set_status(status);
    kind.cleanup(ctx, job.status());
    result
}

/// Runs a job to its terminal status on the calling thread and returns it.
pub(crate) fn execute(ctx: &JobContext) -> JobStatus {
    let job = &ctx.job;
    let _span = tracing::info_span!(
        "job",
        id = job.id().0,
        name = %job.name(),
        kind = %job.job_type()
    )
    .entered();

    if job.status().is_queued() {
        job.set_status(JobStatus::Running);
    }
    log::info!("Start {} JobId {}, Job={}", job.job_type(), job.id(), job.name());

    let result = run_phases(ctx);
    if let Err(failure) = &result {
        // Failures before the runner took over.
        if !job.status().is_terminal() {
            ctx.job.add_message(failure.message.clone());
            job.set_status(failure.status);
        }
    }

    for link in job.detach_agents() {
        log::debug!(
            "JobId {}: closing {} connection to {}",
            job.id(),
            link.connection.kind(),
            link.connection.agent_name()
        );
    }

    let status = job.status();
    let end = {
        let state = job.lock();
        JobEndRecord {
            status,
            ended_at: state.timing.ended_at.unwrap_or_else(Utc::now),
            files: state.files,
            bytes: state.bytes,
        }
    };
    if let Err(e) = ctx.catalog().update_job_end_record(job.id(), &end) {
        log::error!("JobId {}: failed to update end record: {}", job.id(), e);
        job.add_message(format!("Could not update the catalog: {}", e));
        job.set_status(JobStatus::FatalError);
    }
    job.status()
}

/// Worker thread entry for an admitted job; frees its slot when done.
pub(crate) fn run_job(ctx: JobContext) {
    let status = execute(&ctx);
    log::debug!("JobId {} worker done: {}", ctx.job.id(), status.as_str());
    ctx.queue.finish(ctx.job.id());
}

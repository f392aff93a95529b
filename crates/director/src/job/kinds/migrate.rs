use std::sync::Arc;
use std::thread;

use chrono::Utc;
use crossbeam_channel::{bounded, select};

use crate::catalog::JobEntry;
use crate::job::record::{JobHandle, JobPayload, JobRequest, JobType};
use crate::job::runner::{JobContext, JobFailure, JobOutcome, JobRunner};
use crate::job::status::JobStatus;
use crate::job::{JobId, JobLevel};
use crate::migrate::select_job_ids;
use crate::scheduler::worker;

/// Migrate or copy. Without a source job it is a control job that selects
/// sources and submits one job per source; with one it drives a linked data
/// mover that rewrites the source into the next pool.
#[derive(Debug, Default)]
pub struct MigrateJob {
    copy: bool,
    source: Option<JobId>,
    source_entry: Option<JobEntry>,
    next_pool: Option<String>,
}

impl MigrateJob {
    pub fn new(copy: bool, source: Option<JobId>) -> Self {
        Self {
            copy,
            source,
            ..Default::default()
        }
    }

    fn verb(&self) -> &'static str {
        if self.copy {
            "copy"
        } else {
            "migrate"
        }
    }

    fn run_control(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let definition = Arc::clone(ctx.job.definition());
        let ids = select_job_ids(&definition, ctx.config(), ctx.catalog(), Utc::now())?;
        if ids.is_empty() {
            ctx.job
                .add_message(format!("No JobIds found to {}.", self.verb()));
            return Ok(JobOutcome::default());
        }

        let mut outcome = JobOutcome::default();
        for source in ids {
            ctx.checkpoint()?;
            let request = JobRequest::from_definition(Arc::clone(&definition))
                .with_payload(JobPayload::Migrate { source })
                .skip_duplicate_check(true);
            match ctx.queue.submit(request) {
                Ok(id) => ctx.job.add_message(format!(
                    "Started {} JobId {} for source JobId {}",
                    self.verb(),
                    id,
                    source
                )),
                Err(e) => {
                    ctx.job.add_message(format!(
                        "Could not start {} of JobId {}: {}",
                        self.verb(),
                        source,
                        e
                    ));
                    outcome.warnings += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Request for the data mover: a backup of the source's client and
    /// fileset that reads the source's media and writes to the next pool.
    fn mover_request(&self, ctx: &JobContext, source: &JobEntry, next_pool: &str) -> JobRequest {
        let config = ctx.config();
        let storages = config
            .pool(next_pool)
            .and_then(|p| p.storage.clone())
            .map(|s| vec![s])
            .unwrap_or_else(|| ctx.job.storages().to_vec());

        let mut request = JobRequest::from_definition(Arc::clone(ctx.job.definition()))
            .with_level(source.level)
            .with_payload(JobPayload::Migrate {
                source: source.job_id,
            })
            .skip_duplicate_check(true);
        request.job_type = JobType::Backup;
        request.client = source.client.clone();
        request.fileset = source.fileset.clone();
        request.pool = Some(next_pool.to_string());
        request.storages = storages;
        request.priority = ctx.job.priority();
        request.no_max_time = true;
        request
    }

    fn run_mover(&mut self, ctx: &JobContext, mover: &JobHandle) -> Result<JobStatus, JobFailure> {
        let (tx, rx) = bounded::<JobStatus>(1);
        let mover_ctx = JobContext {
            job: Arc::clone(mover),
            services: Arc::clone(&ctx.services),
            queue: ctx.queue.clone(),
        };
        thread::Builder::new()
            .name(format!("mover-{}", mover.id()))
            .spawn(move || {
                let status = worker::execute(&mover_ctx);
                let _ = tx.send(status);
            })
            .map_err(|e| JobFailure::fatal(format!("Failed to start data mover: {}", e)))?;

        let result = select! {
            recv(rx) -> status => status,
            recv(ctx.job.cancel_token().signal()) -> _ => {
                log::info!("JobId {}: canceling data mover JobId {}", ctx.job.id(), mover.id());
                mover.cancel();
                rx.recv()
            }
        };
        result.map_err(|_| JobFailure::fatal("Data mover ended without reporting a status"))
    }
}

impl JobRunner for MigrateJob {
    fn init(&mut self, ctx: &JobContext) -> Result<(), JobFailure> {
        let Some(source) = self.source else {
            if ctx.job.definition().selection.is_none() {
                return Err(JobFailure::error(format!(
                    "No source job and no selection configured to {}",
                    self.verb()
                )));
            }
            return Ok(());
        };

        let entry = ctx.catalog().get_job_record(source)?;
        if entry.job_type != JobType::Backup || !entry.status.is_success() {
            return Err(JobFailure::error(format!(
                "JobId {} is not a backup that can be {}",
                source,
                if self.copy { "copied" } else { "migrated" }
            )));
        }
        let pool = entry
            .pool
            .clone()
            .or_else(|| ctx.job.pool().map(str::to_string))
            .ok_or_else(|| JobFailure::error(format!("JobId {} has no pool", source)))?;
        let next_pool = ctx
            .config()
            .pool(&pool)
            .and_then(|p| p.next_pool.clone())
            .ok_or_else(|| JobFailure::error(format!("Pool {} has no next pool", pool)))?;

        self.next_pool = Some(next_pool);
        self.source_entry = Some(entry);
        Ok(())
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let (Some(source), Some(next_pool)) = (self.source_entry.clone(), self.next_pool.clone())
        else {
            return self.run_control(ctx);
        };
        if source.migrated {
            ctx.job
                .add_message(format!("JobId {} was already migrated", source.job_id));
            return Ok(JobOutcome::default());
        }

        let mover = ctx
            .queue
            .register_linked(self.mover_request(ctx, &source, &next_pool))?;
        ctx.job.attach_mover(Arc::clone(&mover));
        ctx.job.add_message(format!(
            "Data mover JobId {} will {} JobId {} to pool {}",
            mover.id(),
            self.verb(),
            source.job_id,
            next_pool
        ));

        let result = self.run_mover(ctx, &mover);
        ctx.queue.release_linked(mover.id());
        let status = result?;

        let outcome = {
            let state = mover.lock();
            JobOutcome {
                files: state.files,
                bytes: state.bytes,
                errors: state.errors,
                warnings: state.warnings,
                volumes: state.volumes.clone(),
            }
        };

        match status {
            s if s.is_success() => {
                if self.copy {
                    ctx.catalog().record_copy(source.job_id, mover.id())?;
                } else {
                    ctx.catalog().mark_job_migrated(source.job_id)?;
                }
                Ok(outcome)
            }
            JobStatus::Canceled => Err(JobFailure::canceled()),
            other => Err(JobFailure {
                status: if other == JobStatus::FatalError {
                    JobStatus::FatalError
                } else {
                    JobStatus::ErrorTerminated
                },
                message: format!("Data mover JobId {} ended: {}", mover.id(), other),
            }),
        }
    }

    fn cleanup(&mut self, ctx: &JobContext, status: JobStatus) {
        if let (Some(source), true) = (&self.source_entry, status.is_success()) {
            let level = if source.level == JobLevel::None {
                String::new()
            } else {
                format!(" ({})", source.level)
            };
            log::info!(
                "JobId {}: {} of JobId {}{} finished",
                ctx.job.id(),
                self.verb(),
                source.job_id,
                level
            );
        }
    }
}

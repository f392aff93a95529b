use crate::agent::AgentSignal;
use crate::bootstrap::BootstrapRecord;
use crate::job::kinds::{prepare_bootstrap, PreparedBootstrap};
use crate::job::runner::{JobContext, JobFailure, JobOutcome, JobRunner};
use crate::job::status::JobStatus;
use crate::job::JobId;

/// Backup from a file agent, or a read of earlier jobs' media (virtual full,
/// data mover) handled by the storage agent alone.
#[derive(Debug, Default)]
pub struct BackupJob {
    reads_media: bool,
    sources: Vec<JobId>,
    bootstrap: Option<PreparedBootstrap>,
}

impl BackupJob {
    pub fn new(reads_media: bool, sources: Vec<JobId>) -> Self {
        Self {
            reads_media,
            sources,
            bootstrap: None,
        }
    }

    pub fn sources(&self) -> &[JobId] {
        &self.sources
    }

    /// Prior jobs of the same name, client and fileset, back to the last full.
    fn chain_sources(ctx: &JobContext) -> Result<Vec<JobId>, JobFailure> {
        let job = &ctx.job;
        let (Some(client), Some(fileset)) = (job.client(), job.fileset()) else {
            return Err(JobFailure::error(
                "Virtual full needs a client and a fileset to find prior jobs",
            ));
        };
        let chain = ctx
            .catalog()
            .job_chain(&job.definition().name, client, fileset)?;
        Ok(chain.into_iter().map(|j| j.job_id).collect())
    }
}

impl JobRunner for BackupJob {
    fn init(&mut self, ctx: &JobContext) -> Result<(), JobFailure> {
        let storage = ctx.storage_name()?;
        if !self.reads_media {
            if ctx.job.client().is_none() {
                return Err(JobFailure::error("Backup job has no client"));
            }
            return Ok(());
        }

        if self.sources.is_empty() {
            self.sources = Self::chain_sources(ctx)?;
        }
        if self.sources.is_empty() {
            return Err(JobFailure::error("No prior jobs found to read"));
        }

        let mut bsr = BootstrapRecord::new();
        for id in &self.sources {
            bsr.add_all_selection(*id);
        }
        let prepared = prepare_bootstrap(ctx, &mut bsr, self.sources.clone(), None)?;
        if prepared.output.storage.as_deref().is_some_and(|s| s != storage) {
            ctx.job.add_message(format!(
                "Reading from storage {} and writing to {}",
                prepared.output.storage.as_deref().unwrap_or_default(),
                storage
            ));
        }
        ctx.job.lock().bootstrap = Some(bsr);
        self.bootstrap = Some(prepared);
        Ok(())
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let token = ctx.job.cancel_token();
        let agent_job = ctx.agent_job();

        let sd = ctx.connect_storage(&ctx.storage_name()?)?;
        if let Some(prepared) = &self.bootstrap {
            sd.send_bootstrap(&prepared.output.text)?;
        }
        sd.start_job(&agent_job)?;

        if self.reads_media {
            let report = sd.wait_for_termination(token)?;
            return Ok(JobOutcome::from_report(&report));
        }

        let fd = ctx.connect_client()?;
        fd.start_job(&agent_job)?;
        let fd_report = fd.wait_for_termination(token)?;
        ctx.checkpoint()?;

        sd.signal(AgentSignal::EndOfData)?;
        let sd_report = sd.wait_for_termination(token)?;

        let mut outcome = JobOutcome::from_report(&fd_report);
        outcome.merge(&sd_report);
        Ok(outcome)
    }

    fn cleanup(&mut self, ctx: &JobContext, status: JobStatus) {
        if self.reads_media && status.is_success() {
            log::info!(
                "JobId {} read {} prior job(s)",
                ctx.job.id(),
                self.sources.len()
            );
        }
    }
}

use crate::bootstrap::BootstrapRecord;
use crate::job::kinds::prepare_bootstrap;
use crate::job::runner::{JobContext, JobFailure, JobOutcome, JobRunner};
use crate::job::JobId;

/// Runs on the director alone; nothing is contacted.
#[derive(Debug, Default)]
pub struct AdminJob;

impl JobRunner for AdminJob {
    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        ctx.checkpoint()?;
        ctx.job.add_message("Admin job completed");
        Ok(JobOutcome::default())
    }
}

/// Bookkeeping-only archive job.
#[derive(Debug, Default)]
pub struct ArchiveJob;

impl JobRunner for ArchiveJob {
    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        ctx.checkpoint()?;
        ctx.job.add_message("Archive job completed");
        Ok(JobOutcome::default())
    }
}

/// Reads a prior backup back and has the file agent compare it.
#[derive(Debug, Default)]
pub struct VerifyJob {
    target: Option<JobId>,
    bootstrap_text: Option<String>,
    expected_files: u64,
}

impl VerifyJob {
    pub fn new(target: Option<JobId>) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }
}

impl JobRunner for VerifyJob {
    fn init(&mut self, ctx: &JobContext) -> Result<(), JobFailure> {
        let target = self
            .target
            .ok_or_else(|| JobFailure::error("Verify job has no job to verify"))?;
        let entry = ctx.catalog().get_job_record(target)?;
        if !entry.is_usable_backup() {
            return Err(JobFailure::error(format!(
                "JobId {} is not a verifiable backup",
                target
            )));
        }

        let mut bsr = BootstrapRecord::new();
        bsr.add_all_selection(target);
        let prepared = prepare_bootstrap(ctx, &mut bsr, vec![target], None)?;
        ctx.job
            .add_message(format!("Verifying against JobId {}", target));
        self.expected_files = entry.files;
        self.bootstrap_text = Some(prepared.output.text);
        Ok(())
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let token = ctx.job.cancel_token();
        let agent_job = ctx.agent_job();

        let sd = ctx.connect_storage(&ctx.storage_name()?)?;
        if let Some(text) = &self.bootstrap_text {
            sd.send_bootstrap(text)?;
        }
        sd.start_job(&agent_job)?;

        let fd = ctx.connect_client()?;
        fd.start_job(&agent_job)?;
        let fd_report = fd.wait_for_termination(token)?;
        ctx.checkpoint()?;
        let sd_report = sd.wait_for_termination(token)?;

        let mut outcome = JobOutcome::from_report(&fd_report);
        outcome.merge(&sd_report);
        if self.expected_files > 0 && outcome.files != self.expected_files {
            ctx.job.add_message(format!(
                "Verified {} files, backup recorded {}",
                outcome.files, self.expected_files
            ));
            outcome.warnings += 1;
        }
        Ok(outcome)
    }
}

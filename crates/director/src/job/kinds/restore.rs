use crate::error::BootstrapError;
use crate::job::kinds::{prepare_bootstrap, PreparedBootstrap};
use crate::job::runner::{JobContext, JobFailure, JobOutcome, JobRunner};

#[derive(Debug, Default)]
pub struct RestoreJob {
    bootstrap: Option<PreparedBootstrap>,
}

impl RestoreJob {
    pub fn bootstrap(&self) -> Option<&PreparedBootstrap> {
        self.bootstrap.as_ref()
    }
}

impl JobRunner for RestoreJob {
    fn init(&mut self, ctx: &JobContext) -> Result<(), JobFailure> {
        let (bsr, tree) = {
            let mut state = ctx.job.lock();
            (state.bootstrap.take(), state.tree.take())
        };
        let mut bsr = bsr.unwrap_or_default();
        if bsr.is_empty() {
            if let Some(tree) = &tree {
                tree.add_to_bootstrap(&mut bsr);
            }
        }

        let pinned = ctx.job.storages().first().cloned();
        let result = prepare_bootstrap(ctx, &mut bsr, Vec::new(), pinned);
        {
            let mut state = ctx.job.lock();
            state.bootstrap = Some(bsr);
            state.tree = tree;
        }

        match result {
            Ok(prepared) => {
                self.bootstrap = Some(prepared);
                Ok(())
            }
            Err(BootstrapError::EmptySelection | BootstrapError::ZeroFiles) => {
                ctx.job.add_message("No files selected to be restored.");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let Some(prepared) = &self.bootstrap else {
            return Ok(JobOutcome::default());
        };
        let token = ctx.job.cancel_token();
        let agent_job = ctx.agent_job();

        let storage = match &prepared.output.storage {
            Some(storage) => storage.clone(),
            None => ctx.storage_name()?,
        };
        let sd = ctx.connect_storage(&storage)?;
        sd.send_bootstrap(&prepared.output.text)?;
        sd.start_job(&agent_job)?;

        let fd = ctx.connect_client()?;
        fd.start_job(&agent_job)?;
        let fd_report = fd.wait_for_termination(token)?;
        ctx.checkpoint()?;
        let sd_report = sd.wait_for_termination(token)?;

        let mut outcome = JobOutcome::from_report(&fd_report);
        outcome.merge(&sd_report);
        let expected = prepared.output.total_files;
        if outcome.files < expected {
            ctx.job.add_message(format!(
                "Restored {} of {} expected files",
                outcome.files, expected
            ));
            outcome.warnings += 1;
        }
        Ok(outcome)
    }
}

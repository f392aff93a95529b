//! One runner per job type.

mod admin;
mod backup;
mod consolidate;
mod migrate;
mod restore;

use std::path::PathBuf;

use crate::bootstrap::{write_bootstrap_file, BootstrapOutput, BootstrapRecord, BuildOptions};
use crate::error::BootstrapError;
use crate::job::runner::JobContext;
use crate::job::JobId;

pub use admin::{AdminJob, ArchiveJob, VerifyJob};
pub use backup::BackupJob;
pub use consolidate::ConsolidateJob;
pub use migrate::MigrateJob;
pub use restore::RestoreJob;

/// A bootstrap built and written for the storage agent.
#[derive(Debug, Clone)]
pub struct PreparedBootstrap {
    pub output: BootstrapOutput,
    pub path: PathBuf,
}

/// Completes `bsr` from the catalog, renders it and writes it to the working
/// directory. The path and required volumes are recorded on the job.
pub(crate) fn prepare_bootstrap(
    ctx: &JobContext,
    bsr: &mut BootstrapRecord,
    job_order: Vec<JobId>,
    storage: Option<String>,
) -> Result<PreparedBootstrap, BootstrapError> {
    if bsr.is_empty() {
        return Err(BootstrapError::EmptySelection);
    }
    bsr.complete(ctx.catalog())?;

    let config = ctx.config();
    let options = BuildOptions {
        storages: &config.storages,
        storage,
        job_order,
    };
    let output = bsr.build(&options)?;
    let path = write_bootstrap_file(
        &config.director.working_directory,
        &config.director.name,
        &output,
        ctx.queue.bootstrap_seq(),
    )?;

    ctx.job.add_message(format!(
        "Bootstrap {} selects {} files on {} volume(s)",
        path.display(),
        output.total_files,
        output.required_volumes.len()
    ));
    {
        let mut state = ctx.job.lock();
        state.bootstrap_path = Some(path.clone());
        for volume in &output.required_volumes {
            if !state.volumes.contains(&volume.volume_name) {
                state.volumes.push(volume.volume_name.clone());
            }
        }
    }
    Ok(PreparedBootstrap { output, path })
}

//! The closed set of job kinds and the `init`/`run`/`cleanup` contract each
//! one implements.

use std::sync::Arc;

use crate::agent::{AgentConnection, AgentConnector, AgentJob, AgentKind, AgentReport};
use crate::catalog::Catalog;
use crate::config::DirectorConfig;
use crate::error::{AdmissionError, AgentError, BootstrapError, CatalogError, SelectionError};
use crate::events::JobEventBroadcaster;
use crate::job::kinds::{
    AdminJob, ArchiveJob, BackupJob, ConsolidateJob, MigrateJob, RestoreJob, VerifyJob,
};
use crate::job::record::{JobHandle, JobLevel, JobPayload, JobRequest, JobType};
use crate::job::status::JobStatus;
use crate::scheduler::JobQueue;

/// Collaborators every worker reaches through its context.
pub struct Services {
    pub config: Arc<DirectorConfig>,
    pub catalog: Arc<dyn Catalog>,
    pub agents: Arc<dyn AgentConnector>,
    pub events: JobEventBroadcaster,
}

pub struct JobContext {
    pub job: JobHandle,
    pub services: Arc<Services>,
    pub queue: JobQueue,
}

impl JobContext {
    pub fn config(&self) -> &DirectorConfig {
        &self.services.config
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.services.catalog.as_ref()
    }

    /// Fails with `Canceled` once the job's token has fired.
    pub fn checkpoint(&self) -> Result<(), JobFailure> {
        if self.job.cancel_token().is_cancelled() {
            Err(JobFailure::canceled())
        } else {
            Ok(())
        }
    }

    pub fn agent_job(&self) -> AgentJob {
        AgentJob {
            job_id: self.job.id(),
            job_name: self.job.name().to_string(),
            job_type: self.job.job_type(),
            level: self.job.level(),
        }
    }

    /// Opens a session with an agent and registers it with the job, so that a
    /// cancel from another thread can reach it.
    pub fn connect(
        &self,
        kind: AgentKind,
        name: &str,
        address: &str,
    ) -> Result<Arc<dyn AgentConnection>, JobFailure> {
        self.checkpoint()?;
        let _span = tracing::info_span!("agent.connect", agent = name).entered();
        let connection =
            self.services
                .agents
                .connect(kind, name, address, self.job.cancel_token())?;
        self.job.attach_agent(Arc::clone(&connection));
        self.job
            .add_message(format!("Connected to {} {} at {}", kind, name, address));
        Ok(connection)
    }

    pub fn connect_storage(&self, storage: &str) -> Result<Arc<dyn AgentConnection>, JobFailure> {
        let resource = self.config().storage(storage).ok_or_else(|| {
            JobFailure::error(format!("Storage resource '{}' not defined", storage))
        })?;
        self.connect(AgentKind::Storage, &resource.name, &resource.address)
    }

    pub fn connect_client(&self) -> Result<Arc<dyn AgentConnection>, JobFailure> {
        let name = self
            .job
            .client()
            .ok_or_else(|| JobFailure::error("Job has no client"))?;
        let resource = self
            .config()
            .client(name)
            .ok_or_else(|| JobFailure::error(format!("Client resource '{}' not defined", name)))?;
        self.connect(AgentKind::File, &resource.name, &resource.address)
    }

    /// First storage the job is bound to.
    pub fn storage_name(&self) -> Result<String, JobFailure> {
        self.job
            .storages()
            .first()
            .cloned()
            .or_else(|| {
                self.job
                    .pool()
                    .and_then(|p| self.config().pool(p))
                    .and_then(|p| p.storage.clone())
            })
            .ok_or_else(|| JobFailure::error("No storage specified for job"))
    }
}

/// Counters a run reports back to the record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub files: u64,
    pub bytes: u64,
    pub errors: u32,
    pub warnings: u32,
    pub volumes: Vec<String>,
}

impl JobOutcome {
    pub fn merge(&mut self, report: &AgentReport) {
        self.errors += report.errors;
        self.warnings += report.warnings;
        for volume in &report.volumes {
            if !self.volumes.contains(volume) {
                self.volumes.push(volume.clone());
            }
        }
    }

    pub fn from_report(report: &AgentReport) -> Self {
        let mut outcome = Self {
            files: report.files,
            bytes: report.bytes,
            ..Default::default()
        };
        outcome.merge(report);
        outcome
    }
}

/// Why a run ended early, folded to the terminal status it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub status: JobStatus,
    pub message: String,
}

impl JobFailure {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::ErrorTerminated,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::FatalError,
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: JobStatus::Canceled,
            message: "Job canceled".to_string(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CatalogError> for JobFailure {
    fn from(e: CatalogError) -> Self {
        JobFailure::fatal(e.to_string())
    }
}

impl From<AgentError> for JobFailure {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Canceled => JobFailure::canceled(),
            other => JobFailure::error(other.to_string()),
        }
    }
}

impl From<BootstrapError> for JobFailure {
    fn from(e: BootstrapError) -> Self {
        match e {
            BootstrapError::Catalog(c) => c.into(),
            other => JobFailure::error(other.to_string()),
        }
    }
}

impl From<SelectionError> for JobFailure {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::Catalog(c) => c.into(),
            other => JobFailure::error(other.to_string()),
        }
    }
}

impl From<AdmissionError> for JobFailure {
    fn from(e: AdmissionError) -> Self {
        JobFailure::error(e.to_string())
    }
}

pub trait JobRunner {
    /// Checks resources before any agent is contacted.
    fn init(&mut self, _ctx: &JobContext) -> Result<(), JobFailure> {
        Ok(())
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure>;

    /// Runs once a terminal status is known, whatever it is.
    fn cleanup(&mut self, _ctx: &JobContext, _status: JobStatus) {}
}

/// One variant per job type, chosen once at submission.
#[derive(Debug)]
pub enum JobKind {
    Backup(BackupJob),
    Restore(RestoreJob),
    Verify(VerifyJob),
    Admin(AdminJob),
    Archive(ArchiveJob),
    Migrate(MigrateJob),
    Consolidate(ConsolidateJob),
}

impl JobKind {
    pub fn for_request(request: &JobRequest) -> Self {
        match request.job_type {
            JobType::Backup => {
                // A data mover for migrate/copy reads one job back like a virtual full.
                let sources = match &request.payload {
                    JobPayload::VirtualFull { job_ids } => Some(job_ids.clone()),
                    JobPayload::Migrate { source } => Some(vec![*source]),
                    _ => None,
                };
                let reads_media = request.level == JobLevel::VirtualFull || sources.is_some();
                JobKind::Backup(BackupJob::new(reads_media, sources.unwrap_or_default()))
            }
            JobType::Restore => JobKind::Restore(RestoreJob::default()),
            JobType::Verify => {
                let target = match &request.payload {
                    JobPayload::Verify { target } => *target,
                    _ => None,
                };
                JobKind::Verify(VerifyJob::new(target))
            }
            JobType::Admin => JobKind::Admin(AdminJob),
            JobType::Archive => JobKind::Archive(ArchiveJob),
            JobType::Copy | JobType::Migrate => {
                let source = match &request.payload {
                    JobPayload::Migrate { source } => Some(*source),
                    _ => None,
                };
                JobKind::Migrate(MigrateJob::new(request.job_type == JobType::Copy, source))
            }
            JobType::Consolidate => JobKind::Consolidate(ConsolidateJob::default()),
        }
    }

    fn runner(&mut self) -> &mut dyn JobRunner {
        match self {
            JobKind::Backup(j) => j,
            JobKind::Restore(j) => j,
            JobKind::Verify(j) => j,
            JobKind::Admin(j) => j,
            JobKind::Archive(j) => j,
            JobKind::Migrate(j) => j,
            JobKind::Consolidate(j) => j,
        }
    }
}

impl JobRunner for JobKind {
    fn init(&mut self, ctx: &JobContext) -> Result<(), JobFailure> {
        let _span = tracing::info_span!("job.init").entered();
        self.runner().init(ctx)
    }

    fn run(&mut self, ctx: &JobContext) -> Result<JobOutcome, JobFailure> {
        let _span = tracing::info_span!("job.run").entered();
        self.runner().run(ctx)
    }

    fn cleanup(&mut self, ctx: &JobContext, status: JobStatus) {
        let _span = tracing::info_span!("job.cleanup").entered();
        self.runner().cleanup(ctx, status)
    }
}

/// Terminal status for a finished run.
pub fn final_status(canceled: bool, result: &Result<JobOutcome, JobFailure>) -> JobStatus {
    if canceled {
        return JobStatus::Canceled;
    }
    match result {
        Ok(outcome) if outcome.errors > 0 || outcome.warnings > 0 => JobStatus::Warnings,
        Ok(_) => JobStatus::Terminated,
        Err(failure) => failure.status,
    }
}

//! Catalog collaborator: job bookkeeping and file/media queries.
//!
//! Every call is a fallible round trip. Nothing here retries; workers turn a
//! failure into a job message and a `FatalError` status.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bootstrap::JobMedia;
use crate::error::CatalogError;
use crate::job::{JobId, JobLevel, JobStatus, JobType};

pub use memory::MemoryCatalog;

/// A job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEntry {
    pub job_id: JobId,
    /// Job definition name.
    pub name: String,
    pub job_type: JobType,
    pub level: JobLevel,
    pub client: Option<String>,
    pub fileset: Option<String>,
    pub pool: Option<String>,
    pub status: JobStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub files: u64,
    pub bytes: u64,
    #[serde(default)]
    pub migrated: bool,
}

impl JobEntry {
    /// A finished full backup, the usual seed for catalog fixtures.
    pub fn backup(job_id: JobId, name: &str, client: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            name: name.to_string(),
            job_type: JobType::Backup,
            level: JobLevel::Full,
            client: Some(client.to_string()),
            fileset: None,
            pool: None,
            status: JobStatus::Terminated,
            scheduled_at: Some(now),
            started_at: Some(now),
            ended_at: Some(now),
            files: 0,
            bytes: 0,
            migrated: false,
        }
    }

    pub fn with_level(mut self, level: JobLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_fileset(mut self, fileset: &str) -> Self {
        self.fileset = Some(fileset.to_string());
        self
    }

    pub fn in_pool(mut self, pool: &str) -> Self {
        self.pool = Some(pool.to_string());
        self
    }

    pub fn ended_at(mut self, when: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(when);
        self.started_at = Some(when);
        self.ended_at = Some(when);
        self
    }

    pub fn with_size(mut self, files: u64, bytes: u64) -> Self {
        self.files = files;
        self.bytes = bytes;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Counts as restorable data for selection and consolidation.
    pub fn is_usable_backup(&self) -> bool {
        self.job_type == JobType::Backup && self.status.is_success() && !self.migrated
    }
}

/// End-of-job bookkeeping written by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEndRecord {
    pub status: JobStatus,
    pub ended_at: DateTime<Utc>,
    pub files: u64,
    pub bytes: u64,
}

/// One backed-up path of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub job_id: JobId,
    /// Full path; directories end in `/`.
    pub path: String,
    pub file_index: u32,
    #[serde(default)]
    pub link_fi: u32,
    #[serde(default = "default_nlink")]
    pub nlink: u32,
    #[serde(default)]
    pub delta_seq: u32,
    #[serde(default)]
    pub soft_link: bool,
}

fn default_nlink() -> u32 {
    1
}

impl FileEntry {
    pub fn new(job_id: JobId, path: &str, file_index: u32) -> Self {
        Self {
            job_id,
            path: path.to_string(),
            file_index,
            link_fi: 0,
            nlink: 1,
            delta_seq: 0,
            soft_link: false,
        }
    }

    pub fn hard_link(mut self, nlink: u32, link_fi: u32) -> Self {
        self.nlink = nlink;
        self.link_fi = link_fi;
        self
    }

    pub fn delta(mut self, delta_seq: u32) -> Self {
        self.delta_seq = delta_seq;
        self
    }

    pub fn soft_link(mut self) -> Self {
        self.soft_link = true;
        self
    }
}

/// A volume row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeEntry {
    pub volume_name: String,
    pub pool: String,
    pub media_type: String,
    pub storage: String,
    pub bytes: u64,
    pub last_written: DateTime<Utc>,
}

pub trait Catalog: Send + Sync {
    fn create_job_record(&self, entry: &JobEntry) -> Result<(), CatalogError>;

    fn update_job_start_record(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), CatalogError>;

    fn update_job_end_record(&self, job_id: JobId, end: &JobEndRecord)
        -> Result<(), CatalogError>;

    fn get_job_record(&self, job_id: JobId) -> Result<JobEntry, CatalogError>;

    /// Highest job id on record, so new ids never collide with history.
    fn highest_job_id(&self) -> Result<JobId, CatalogError>;

    /// Volumes and session identity of a job, volumes in recorded order.
    fn job_media(&self, job_id: JobId) -> Result<JobMedia, CatalogError>;

    /// File rows of the given jobs, ordered by ascending job id.
    fn file_entries(&self, job_ids: &[JobId]) -> Result<Vec<FileEntry>, CatalogError>;

    fn pool_volumes(&self, pool: &str) -> Result<Vec<VolumeEntry>, CatalogError>;

    fn volume_job_ids(&self, volume: &str) -> Result<Vec<JobId>, CatalogError>;

    fn pool_clients(&self, pool: &str) -> Result<Vec<String>, CatalogError>;

    fn client_job_ids(&self, pool: &str, client: &str) -> Result<Vec<JobId>, CatalogError>;

    fn pool_job_names(&self, pool: &str) -> Result<Vec<String>, CatalogError>;

    fn named_job_ids(&self, pool: &str, name: &str) -> Result<Vec<JobId>, CatalogError>;

    fn query_job_ids(&self, query: &str) -> Result<Vec<JobId>, CatalogError>;

    fn pool_job_ids_ended_before(
        &self,
        pool: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobId>, CatalogError>;

    fn pool_uncopied_job_ids(&self, pool: &str) -> Result<Vec<JobId>, CatalogError>;

    /// Latest full backup of the triple followed by every later backup, ascending.
    fn job_chain(
        &self,
        name: &str,
        client: &str,
        fileset: &str,
    ) -> Result<Vec<JobEntry>, CatalogError>;

    fn mark_job_migrated(&self, job_id: JobId) -> Result<(), CatalogError>;

    fn record_copy(&self, source: JobId, copy: JobId) -> Result<(), CatalogError>;
}

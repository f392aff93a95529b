use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::{JobLevel, JobType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorConfig {
    pub version: String,
    pub director: DirectorSettings,
    #[serde(default)]
    pub clients: Vec<ClientResource>,
    #[serde(default)]
    pub storages: Vec<StorageResource>,
    #[serde(default)]
    pub pools: Vec<PoolResource>,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

impl DirectorConfig {
    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn client(&self, name: &str) -> Option<&ClientResource> {
        self.clients.iter().find(|c| c.name == name)
    }

    pub fn storage(&self, name: &str) -> Option<&StorageResource> {
        self.storages.iter().find(|s| s.name == name)
    }

    pub fn pool(&self, name: &str) -> Option<&PoolResource> {
        self.pools.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorSettings {
    pub name: String,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_secs: u64,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_working_directory() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".director").join("working"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/director"))
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

fn default_watchdog_interval() -> u64 {
    60
}

fn default_history_size() -> usize {
    100
}

fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl DirectorSettings {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            working_directory: default_working_directory(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            watchdog_interval_secs: default_watchdog_interval(),
            history_size: default_history_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResource {
    pub name: String,
    pub address: String,
    #[serde(default = "default_one")]
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageResource {
    pub name: String,
    pub address: String,
    pub media_type: String,
    #[serde(default)]
    pub devices: Vec<String>,
    /// Name of the device group this storage belongs to, if any.
    #[serde(default)]
    pub device_group: Option<String>,
    #[serde(default = "default_one")]
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolResource {
    pub name: String,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub next_pool: Option<String>,
    #[serde(default)]
    pub migration_high_bytes: u64,
    #[serde(default)]
    pub migration_low_bytes: u64,
    /// Age in seconds after which a job becomes eligible for pool-time migration.
    #[serde(default)]
    pub migration_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default = "default_level")]
    pub level: JobLevel,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub fileset: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub storage: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_one")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub allow_mixed_priority: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    #[serde(default)]
    pub limits: RunLimits,
    #[serde(default)]
    pub selection: Option<SelectionConfig>,
    #[serde(default)]
    pub always_incremental: Option<AlwaysIncrementalConfig>,
    /// Per-invocation cap on consolidations that fold in a full backup (0 = unlimited).
    #[serde(default)]
    pub max_full_consolidations: u32,
}

fn default_level() -> JobLevel {
    JobLevel::Full
}

fn default_priority() -> u32 {
    10
}

impl JobDefinition {
    pub fn new(name: &str, job_type: JobType) -> Self {
        Self {
            name: name.to_string(),
            job_type,
            level: match job_type {
                JobType::Backup => JobLevel::Full,
                _ => JobLevel::None,
            },
            client: None,
            fileset: None,
            pool: None,
            storage: Vec::new(),
            priority: default_priority(),
            max_concurrent_jobs: 1,
            allow_mixed_priority: false,
            enabled: true,
            duplicates: DuplicatePolicy::default(),
            limits: RunLimits::default(),
            selection: None,
            always_incremental: None,
            max_full_consolidations: 0,
        }
    }

    pub fn is_always_incremental(&self) -> bool {
        self.always_incremental.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePolicy {
    #[serde(default)]
    pub allow_duplicate_jobs: bool,
    /// Jobs of this definition neither check for duplicates nor count as one.
    #[serde(default)]
    pub ignore_duplicate_checking: bool,
    #[serde(default)]
    pub cancel_lower_level_duplicates: bool,
    #[serde(default)]
    pub cancel_queued_duplicates: bool,
    #[serde(default)]
    pub cancel_running_duplicates: bool,
    /// Seconds; a duplicate started longer ago than this is not treated as one (0 = off).
    #[serde(default)]
    pub proximity_secs: u64,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self {
            allow_duplicate_jobs: false,
            ignore_duplicate_checking: false,
            cancel_lower_level_duplicates: false,
            cancel_queued_duplicates: false,
            cancel_running_duplicates: false,
            proximity_secs: 0,
        }
    }
}

/// Time ceilings in seconds, 0 meaning unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLimits {
    #[serde(default)]
    pub max_wait_time: u64,
    #[serde(default)]
    pub max_run_time: u64,
    #[serde(default)]
    pub full_max_run_time: u64,
    #[serde(default)]
    pub differential_max_run_time: u64,
    #[serde(default)]
    pub incremental_max_run_time: u64,
    #[serde(default)]
    pub max_run_sched_time: u64,
}

impl RunLimits {
    pub fn is_unlimited(&self) -> bool {
        self.max_wait_time == 0 && self.max_run_sched_time == 0 && self.run_time_is_unlimited()
    }

    fn run_time_is_unlimited(&self) -> bool {
        self.max_run_time == 0
            && self.full_max_run_time == 0
            && self.differential_max_run_time == 0
            && self.incremental_max_run_time == 0
    }

    /// Run-time ceiling for a level; a non-zero level-specific value wins over the generic one.
    pub fn run_time_for(&self, level: JobLevel) -> u64 {
        let specific = match level {
            JobLevel::Full => self.full_max_run_time,
            JobLevel::Differential => self.differential_max_run_time,
            JobLevel::Incremental => self.incremental_max_run_time,
            _ => 0,
        };
        if specific != 0 {
            specific
        } else {
            self.max_run_time
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionType {
    SmallestVolume,
    OldestVolume,
    Volume,
    Client,
    Job,
    SqlQuery,
    PoolOccupancy,
    PoolTime,
    PoolUncopiedJobs,
}

impl SelectionType {
    pub fn needs_pattern(&self) -> bool {
        matches!(
            self,
            SelectionType::Volume | SelectionType::Client | SelectionType::Job | SelectionType::SqlQuery
        )
    }

    pub fn is_regex(&self) -> bool {
        matches!(
            self,
            SelectionType::Volume | SelectionType::Client | SelectionType::Job
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(rename = "type")]
    pub selection_type: SelectionType,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlwaysIncrementalConfig {
    /// Seconds; only jobs older than this are consolidated.
    #[serde(default)]
    pub job_retention_secs: u64,
    #[serde(default)]
    pub keep_number: u32,
    /// Seconds; when set, the full is folded in only once it is older than this.
    #[serde(default)]
    pub max_full_age_secs: Option<u64>,
}

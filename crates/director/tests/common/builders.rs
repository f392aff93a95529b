//! Builder patterns for creating test configurations programmatically.

#![allow(dead_code)]

use std::path::Path;

use director::config::{
    AlwaysIncrementalConfig, ClientResource, DirectorConfig, DirectorSettings, DuplicatePolicy,
    JobDefinition, PoolResource, RunLimits, SelectionConfig, SelectionType, StorageResource,
};
use director::{JobLevel, JobType};

/// Builder for creating `DirectorConfig` instances.
pub struct ConfigBuilder {
    settings: DirectorSettings,
    clients: Vec<ClientResource>,
    storages: Vec<StorageResource>,
    pools: Vec<PoolResource>,
    jobs: Vec<JobDefinition>,
}

impl ConfigBuilder {
    /// Create a new builder writing into `working_directory`.
    pub fn new(working_directory: &Path) -> Self {
        let mut settings = DirectorSettings::new("bdir");
        settings.working_directory = working_directory.to_path_buf();
        settings.max_concurrent_jobs = 10;
        Self {
            settings,
            clients: vec![],
            storages: vec![],
            pools: vec![],
            jobs: vec![],
        }
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.settings.max_concurrent_jobs = n;
        self
    }

    pub fn watchdog_interval(mut self, secs: u64) -> Self {
        self.settings.watchdog_interval_secs = secs;
        self
    }

    pub fn history_size(mut self, n: usize) -> Self {
        self.settings.history_size = n;
        self
    }

    /// Add a client allowing `max_jobs` concurrent jobs.
    pub fn client(mut self, name: &str, max_jobs: usize) -> Self {
        self.clients.push(ClientResource {
            name: name.to_string(),
            address: format!("{}:9102", name),
            max_concurrent_jobs: max_jobs,
        });
        self
    }

    /// Add a file storage allowing `max_jobs` concurrent jobs.
    pub fn storage(mut self, name: &str, max_jobs: usize) -> Self {
        self.storages.push(StorageResource {
            name: name.to_string(),
            address: format!("{}:9103", name),
            media_type: "File".to_string(),
            devices: vec![],
            device_group: None,
            max_concurrent_jobs: max_jobs,
        });
        self
    }

    pub fn pool(mut self, name: &str, storage: &str, next_pool: Option<&str>) -> Self {
        self.pools.push(PoolResource {
            name: name.to_string(),
            storage: Some(storage.to_string()),
            next_pool: next_pool.map(str::to_string),
            migration_high_bytes: 0,
            migration_low_bytes: 0,
            migration_time_secs: 0,
        });
        self
    }

    pub fn job(mut self, job: JobDefinition) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn build(self) -> DirectorConfig {
        DirectorConfig {
            version: "1.0".to_string(),
            director: self.settings,
            clients: self.clients,
            storages: self.storages,
            pools: self.pools,
            jobs: self.jobs,
        }
    }
}

/// Builder for creating `JobDefinition` instances.
pub struct JobBuilder {
    job: JobDefinition,
}

impl JobBuilder {
    pub fn new(name: &str, job_type: JobType) -> Self {
        Self {
            job: JobDefinition::new(name, job_type),
        }
    }

    /// A backup of `client`'s `root` fileset to `storage`.
    pub fn backup(name: &str, client: &str, storage: &str) -> Self {
        Self::new(name, JobType::Backup)
            .client(client)
            .fileset("root")
            .storage(storage)
    }

    pub fn client(mut self, client: &str) -> Self {
        self.job.client = Some(client.to_string());
        self
    }

    pub fn fileset(mut self, fileset: &str) -> Self {
        self.job.fileset = Some(fileset.to_string());
        self
    }

    pub fn pool(mut self, pool: &str) -> Self {
        self.job.pool = Some(pool.to_string());
        self
    }

    pub fn storage(mut self, storage: &str) -> Self {
        self.job.storage.push(storage.to_string());
        self
    }

    pub fn level(mut self, level: JobLevel) -> Self {
        self.job.level = level;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.job.max_concurrent_jobs = n;
        self
    }

    pub fn allow_mixed_priority(mut self) -> Self {
        self.job.allow_mixed_priority = true;
        self
    }

    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.job.duplicates = policy;
        self
    }

    pub fn limits(mut self, limits: RunLimits) -> Self {
        self.job.limits = limits;
        self
    }

    pub fn selection(mut self, selection_type: SelectionType, pattern: Option<&str>) -> Self {
        self.job.selection = Some(SelectionConfig {
            selection_type,
            pattern: pattern.map(str::to_string),
        });
        self
    }

    pub fn always_incremental(mut self, keep_number: u32, max_full_age_secs: Option<u64>) -> Self {
        self.job.always_incremental = Some(AlwaysIncrementalConfig {
            job_retention_secs: 0,
            keep_number,
            max_full_age_secs,
        });
        self
    }

    pub fn max_full_consolidations(mut self, n: u32) -> Self {
        self.job.max_full_consolidations = n;
        self
    }

    pub fn build(self) -> JobDefinition {
        self.job
    }
}

/// Duplicate policy with duplicates refused unless a flag says otherwise.
pub fn strict_duplicates() -> DuplicatePolicy {
    DuplicatePolicy {
        allow_duplicate_jobs: false,
        ..Default::default()
    }
}

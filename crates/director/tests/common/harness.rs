//! Test harness for isolated director runs.
//!
//! The `TestHarness` struct owns everything a director needs besides its
//! configuration:
//! - A temporary working directory for bootstrap files
//! - An in-memory catalog that tests seed and inspect
//! - Simulated file and storage agents

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use director::agent::{AgentConnector, SimulatedConnector};
use director::bootstrap::{JobMedia, VolumeParams};
use director::catalog::{FileEntry, JobEntry};
use director::config::DirectorConfig;
use director::{Catalog, Director, JobId, JobLevel, JobStatus, JobSummary, MemoryCatalog};

use super::builders::ConfigBuilder;

/// How long tests wait for a job to reach a terminal state.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestHarness {
    temp_dir: TempDir,
    pub workdir: PathBuf,
    pub catalog: Arc<MemoryCatalog>,
    pub agents: Arc<SimulatedConnector>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let workdir = temp_dir.path().join("working");
        Self {
            temp_dir,
            workdir,
            catalog: Arc::new(MemoryCatalog::new()),
            agents: Arc::new(SimulatedConnector::new()),
        }
    }

    /// A config builder pointed at this harness' working directory.
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(&self.workdir)
    }

    /// Builds and starts a director against the harness' collaborators.
    pub fn director(&self, config: DirectorConfig) -> Director {
        let director = Director::new(
            config,
            Arc::clone(&self.catalog) as Arc<dyn Catalog>,
            Arc::clone(&self.agents) as Arc<dyn AgentConnector>,
        )
        .expect("Failed to create director");
        director.start().expect("Failed to start director");
        director
    }

    /// Seeds a finished backup with one volume covering its files.
    pub fn seed_backup(&self, backup: SeedBackup) -> JobId {
        let id = backup.entry.job_id;
        let count = backup.files.len() as u32;
        self.catalog.insert_job(backup.entry);
        let volume = VolumeParams::new(&backup.volume, "File", &backup.storage)
            .with_indexes(1, count.max(1))
            .with_addresses(0, 1024 * count.max(1) as u64);
        self.catalog.insert_media(
            id,
            JobMedia {
                vol_session_id: id.0,
                vol_session_time: 1_700_000_000,
                volumes: vec![volume],
            },
        );
        self.catalog.insert_files(
            backup
                .files
                .iter()
                .enumerate()
                .map(|(i, p)| FileEntry::new(id, p, i as u32 + 1)),
        );
        id
    }

    /// Bootstrap files written so far, sorted by name.
    pub fn bootstrap_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&self.workdir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|x| x == "bsr"))
                .collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }
}

/// Waits for `id` and returns its summary, panicking on timeout.
pub fn finished(director: &Director, id: JobId) -> JobSummary {
    director
        .wait_for(id, JOB_TIMEOUT)
        .unwrap_or_else(|| panic!("JobId {} did not finish in time", id))
}

/// Polls until `id` reports `status`.
pub fn wait_for_status(director: &Director, id: JobId, status: JobStatus) {
    for _ in 0..500 {
        if director.status(id).is_some_and(|s| s.status == status) {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("JobId {} never reached {:?}", id, status);
}

/// A catalog backup fixture.
pub struct SeedBackup {
    pub entry: JobEntry,
    pub files: Vec<String>,
    pub volume: String,
    pub storage: String,
}

impl SeedBackup {
    pub fn new(id: u32, name: &str, client: &str) -> Self {
        Self {
            entry: JobEntry::backup(JobId(id), name, client).with_fileset("root"),
            files: Vec::new(),
            volume: format!("Full-{:04}", id),
            storage: "File".to_string(),
        }
    }

    pub fn level(mut self, level: JobLevel) -> Self {
        self.entry = self.entry.with_level(level);
        self
    }

    pub fn pool(mut self, pool: &str) -> Self {
        self.entry = self.entry.in_pool(pool);
        self
    }

    pub fn ended_at(mut self, when: DateTime<Utc>) -> Self {
        self.entry = self.entry.ended_at(when);
        self
    }

    pub fn files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self.entry = self.entry.with_size(self.files.len() as u64, 4096);
        self
    }

    pub fn volume(mut self, volume: &str) -> Self {
        self.volume = volume.to_string();
        self
    }
}

//! In-memory catalog for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::bootstrap::JobMedia;
use crate::catalog::{Catalog, FileEntry, JobEndRecord, JobEntry, VolumeEntry};
use crate::error::CatalogError;
use crate::job::{JobId, JobLevel, JobType};

#[derive(Default)]
struct Tables {
    jobs: BTreeMap<JobId, JobEntry>,
    media: HashMap<JobId, JobMedia>,
    files: Vec<FileEntry>,
    volumes: Vec<VolumeEntry>,
    copies: Vec<(JobId, JobId)>,
    queries: HashMap<String, Vec<JobId>>,
    unavailable: Option<String>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("MemoryCatalog read lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("MemoryCatalog write lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn available(&self) -> Result<RwLockReadGuard<'_, Tables>, CatalogError> {
        let tables = self.read();
        match &tables.unavailable {
            Some(reason) => Err(CatalogError::Unavailable(reason.clone())),
            None => Ok(tables),
        }
    }

    fn available_mut(&self) -> Result<RwLockWriteGuard<'_, Tables>, CatalogError> {
        let tables = self.write();
        match &tables.unavailable {
            Some(reason) => Err(CatalogError::Unavailable(reason.clone())),
            None => Ok(tables),
        }
    }

    pub fn insert_job(&self, entry: JobEntry) {
        self.write().jobs.insert(entry.job_id, entry);
    }

    pub fn insert_media(&self, job_id: JobId, media: JobMedia) {
        self.write().media.insert(job_id, media);
    }

    pub fn insert_files(&self, files: impl IntoIterator<Item = FileEntry>) {
        self.write().files.extend(files);
    }

    pub fn insert_volume(&self, volume: VolumeEntry) {
        self.write().volumes.push(volume);
    }

    /// Registers the answer to a literal selection query.
    pub fn insert_query(&self, query: &str, job_ids: Vec<JobId>) {
        self.write().queries.insert(query.to_string(), job_ids);
    }

    /// Makes every subsequent call fail, or restores service with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.write().unavailable = reason.map(str::to_string);
    }

    pub fn job(&self, job_id: JobId) -> Option<JobEntry> {
        self.read().jobs.get(&job_id).cloned()
    }

    pub fn copies(&self) -> Vec<(JobId, JobId)> {
        self.read().copies.clone()
    }
}

fn usable_in_pool<'a>(tables: &'a Tables, pool: &'a str) -> impl Iterator<Item = &'a JobEntry> + 'a {
    tables
        .jobs
        .values()
        .filter(move |j| j.is_usable_backup() && j.pool.as_deref() == Some(pool))
}

impl Catalog for MemoryCatalog {
    fn create_job_record(&self, entry: &JobEntry) -> Result<(), CatalogError> {
        let mut tables = self.available_mut()?;
        tables.jobs.insert(entry.job_id, entry.clone());
        Ok(())
    }

    fn update_job_start_record(
        &self,
        job_id: JobId,
        started_at: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let mut tables = self.available_mut()?;
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or(CatalogError::JobNotFound(job_id))?;
        job.started_at = Some(started_at);
        Ok(())
    }

    fn update_job_end_record(
        &self,
        job_id: JobId,
        end: &JobEndRecord,
    ) -> Result<(), CatalogError> {
        let mut tables = self.available_mut()?;
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or(CatalogError::JobNotFound(job_id))?;
        job.status = end.status;
        job.ended_at = Some(end.ended_at);
        job.files = end.files;
        job.bytes = end.bytes;
        Ok(())
    }

    fn get_job_record(&self, job_id: JobId) -> Result<JobEntry, CatalogError> {
        self.available()?
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(CatalogError::JobNotFound(job_id))
    }

    fn highest_job_id(&self) -> Result<JobId, CatalogError> {
        Ok(self
            .available()?
            .jobs
            .keys()
            .next_back()
            .copied()
            .unwrap_or(JobId(0)))
    }

    fn job_media(&self, job_id: JobId) -> Result<JobMedia, CatalogError> {
        let tables = self.available()?;
        if !tables.jobs.contains_key(&job_id) {
            return Err(CatalogError::JobNotFound(job_id));
        }
        Ok(tables.media.get(&job_id).cloned().unwrap_or_default())
    }

    fn file_entries(&self, job_ids: &[JobId]) -> Result<Vec<FileEntry>, CatalogError> {
        let tables = self.available()?;
        let wanted: BTreeSet<JobId> = job_ids.iter().copied().collect();
        let mut rows: Vec<FileEntry> = tables
            .files
            .iter()
            .filter(|f| wanted.contains(&f.job_id))
            .cloned()
            .collect();
        rows.sort_by_key(|f| f.job_id);
        Ok(rows)
    }

    fn pool_volumes(&self, pool: &str) -> Result<Vec<VolumeEntry>, CatalogError> {
        Ok(self
            .available()?
            .volumes
            .iter()
            .filter(|v| v.pool == pool)
            .cloned()
            .collect())
    }

    fn volume_job_ids(&self, volume: &str) -> Result<Vec<JobId>, CatalogError> {
        let tables = self.available()?;
        Ok(tables
            .jobs
            .values()
            .filter(|j| j.is_usable_backup())
            .filter(|j| {
                tables
                    .media
                    .get(&j.job_id)
                    .map(|m| m.volumes.iter().any(|v| v.volume_name == volume))
                    .unwrap_or(false)
            })
            .map(|j| j.job_id)
            .collect())
    }

    fn pool_clients(&self, pool: &str) -> Result<Vec<String>, CatalogError> {
        let tables = self.available()?;
        let clients: BTreeSet<String> = usable_in_pool(&tables, pool)
            .filter_map(|j| j.client.clone())
            .collect();
        Ok(clients.into_iter().collect())
    }

    fn client_job_ids(&self, pool: &str, client: &str) -> Result<Vec<JobId>, CatalogError> {
        let tables = self.available()?;
        Ok(usable_in_pool(&tables, pool)
            .filter(|j| j.client.as_deref() == Some(client))
            .map(|j| j.job_id)
            .collect())
    }

    fn pool_job_names(&self, pool: &str) -> Result<Vec<String>, CatalogError> {
        let tables = self.available()?;
        let names: BTreeSet<String> = usable_in_pool(&tables, pool)
            .map(|j| j.name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    fn named_job_ids(&self, pool: &str, name: &str) -> Result<Vec<JobId>, CatalogError> {
        let tables = self.available()?;
        Ok(usable_in_pool(&tables, pool)
            .filter(|j| j.name == name)
            .map(|j| j.job_id)
            .collect())
    }

    fn query_job_ids(&self, query: &str) -> Result<Vec<JobId>, CatalogError> {
        self.available()?
            .queries
            .get(query)
            .cloned()
            .ok_or_else(|| CatalogError::Query(format!("unsupported query: {}", query)))
    }

    fn pool_job_ids_ended_before(
        &self,
        pool: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobId>, CatalogError> {
        let tables = self.available()?;
        Ok(usable_in_pool(&tables, pool)
            .filter(|j| j.ended_at.map(|t| t < cutoff).unwrap_or(false))
            .map(|j| j.job_id)
            .collect())
    }

    fn pool_uncopied_job_ids(&self, pool: &str) -> Result<Vec<JobId>, CatalogError> {
        let tables = self.available()?;
        let copied: BTreeSet<JobId> = tables.copies.iter().map(|(src, _)| *src).collect();
        Ok(usable_in_pool(&tables, pool)
            .filter(|j| !copied.contains(&j.job_id))
            .map(|j| j.job_id)
            .collect())
    }

    fn job_chain(
        &self,
        name: &str,
        client: &str,
        fileset: &str,
    ) -> Result<Vec<JobEntry>, CatalogError> {
        let tables = self.available()?;
        let matching: Vec<&JobEntry> = tables
            .jobs
            .values()
            .filter(|j| {
                j.is_usable_backup()
                    && j.name == name
                    && j.client.as_deref() == Some(client)
                    && j.fileset.as_deref() == Some(fileset)
            })
            .collect();

        let start = matching
            .iter()
            .rposition(|j| matches!(j.level, JobLevel::Full | JobLevel::VirtualFull));
        Ok(match start {
            Some(pos) => matching[pos..].iter().map(|j| (*j).clone()).collect(),
            None => Vec::new(),
        })
    }

    fn mark_job_migrated(&self, job_id: JobId) -> Result<(), CatalogError> {
        let mut tables = self.available_mut()?;
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or(CatalogError::JobNotFound(job_id))?;
        job.migrated = true;
        Ok(())
    }

    fn record_copy(&self, source: JobId, copy: JobId) -> Result<(), CatalogError> {
        let mut tables = self.available_mut()?;
        if !tables.jobs.contains_key(&source) {
            return Err(CatalogError::JobNotFound(source));
        }
        tables.copies.push((source, copy));
        if let Some(job) = tables.jobs.get_mut(&copy) {
            job.job_type = JobType::Copy;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_chain_starts_at_latest_full() {
        let catalog = MemoryCatalog::new();
        let mk = |id: u32, level: JobLevel| {
            JobEntry::backup(JobId(id), "ai", "web-fd")
                .with_fileset("Linux All")
                .with_level(level)
        };
        catalog.insert_job(mk(1, JobLevel::Full));
        catalog.insert_job(mk(2, JobLevel::Incremental));
        catalog.insert_job(mk(3, JobLevel::Full));
        catalog.insert_job(mk(4, JobLevel::Incremental));
        catalog.insert_job(mk(5, JobLevel::Incremental));

        let chain = catalog.job_chain("ai", "web-fd", "Linux All").unwrap();
        let ids: Vec<JobId> = chain.iter().map(|j| j.job_id).collect();
        assert_eq!(ids, vec![JobId(3), JobId(4), JobId(5)]);
    }

    #[test]
    fn test_unavailable_catalog_fails_every_call() {
        let catalog = MemoryCatalog::new();
        catalog.insert_job(JobEntry::backup(JobId(1), "nightly", "web-fd"));
        catalog.set_unavailable(Some("connection reset"));
        assert!(matches!(
            catalog.get_job_record(JobId(1)),
            Err(CatalogError::Unavailable(_))
        ));
        catalog.set_unavailable(None);
        assert!(catalog.get_job_record(JobId(1)).is_ok());
    }

    #[test]
    fn test_copied_jobs_leave_uncopied_list() {
        let catalog = MemoryCatalog::new();
        catalog.insert_job(JobEntry::backup(JobId(1), "a", "web-fd").in_pool("Full"));
        catalog.insert_job(JobEntry::backup(JobId(2), "b", "web-fd").in_pool("Full"));
        catalog.record_copy(JobId(1), JobId(10)).unwrap();
        assert_eq!(catalog.pool_uncopied_job_ids("Full").unwrap(), vec![JobId(2)]);
    }

    #[test]
    fn test_highest_job_id() {
        let catalog = MemoryCatalog::new();
        assert_eq!(catalog.highest_job_id().unwrap(), JobId(0));
        catalog.insert_job(JobEntry::backup(JobId(41), "a", "web-fd"));
        catalog.insert_job(JobEntry::backup(JobId(7), "b", "web-fd"));
        assert_eq!(catalog.highest_job_id().unwrap(), JobId(41));
    }
}

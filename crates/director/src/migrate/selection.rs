//! Source job selection for migrate and copy control jobs.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::catalog::{Catalog, VolumeEntry};
use crate::config::{DirectorConfig, JobDefinition, PoolResource, SelectionType};
use crate::error::SelectionError;
use crate::job::JobId;

/// Selection state of one control job invocation.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    pub selection_type: SelectionType,
    pub pool: String,
    pub pattern: Option<String>,
    /// Candidate source jobs, ascending and without duplicates.
    pub job_ids: Vec<JobId>,
}

impl SelectionContext {
    pub fn for_definition(definition: &JobDefinition) -> Result<Self, SelectionError> {
        let selection = definition
            .selection
            .as_ref()
            .ok_or_else(|| SelectionError::MissingPattern(definition.name.clone()))?;
        let pool = definition
            .pool
            .clone()
            .ok_or_else(|| SelectionError::MissingPool(definition.name.clone()))?;
        if selection.selection_type.needs_pattern() && selection.pattern.is_none() {
            return Err(SelectionError::MissingPattern(definition.name.clone()));
        }
        Ok(Self {
            selection_type: selection.selection_type,
            pool,
            pattern: selection.pattern.clone(),
            job_ids: Vec::new(),
        })
    }

    fn regex(&self) -> Result<Regex, SelectionError> {
        let pattern = self.pattern.as_deref().unwrap_or_default();
        Regex::new(pattern).map_err(|e| SelectionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    }

    fn pool_resource<'c>(&self, config: &'c DirectorConfig) -> Result<&'c PoolResource, SelectionError> {
        config
            .pool(&self.pool)
            .ok_or_else(|| SelectionError::UnknownPool(self.pool.clone()))
    }

    /// Queries the catalog and fills `job_ids`.
    pub fn select(
        &mut self,
        config: &DirectorConfig,
        catalog: &dyn Catalog,
        now: DateTime<Utc>,
    ) -> Result<&[JobId], SelectionError> {
        let pool = self.pool.as_str();
        let ids: Vec<JobId> = match self.selection_type {
            SelectionType::SmallestVolume => {
                let volumes = catalog.pool_volumes(pool)?;
                match volumes.iter().min_by(|a, b| {
                    a.bytes.cmp(&b.bytes).then_with(|| a.volume_name.cmp(&b.volume_name))
                }) {
                    Some(v) => catalog.volume_job_ids(&v.volume_name)?,
                    None => Vec::new(),
                }
            }
            SelectionType::OldestVolume => {
                let volumes = catalog.pool_volumes(pool)?;
                match volumes.iter().min_by(|a, b| {
                    a.last_written
                        .cmp(&b.last_written)
                        .then_with(|| a.volume_name.cmp(&b.volume_name))
                }) {
                    Some(v) => catalog.volume_job_ids(&v.volume_name)?,
                    None => Vec::new(),
                }
            }
            SelectionType::Volume => {
                let re = self.regex()?;
                let mut ids = Vec::new();
                for volume in catalog.pool_volumes(pool)? {
                    if re.is_match(&volume.volume_name) {
                        ids.extend(catalog.volume_job_ids(&volume.volume_name)?);
                    }
                }
                ids
            }
            SelectionType::Client => {
                let re = self.regex()?;
                let mut ids = Vec::new();
                for client in catalog.pool_clients(pool)? {
                    if re.is_match(&client) {
                        ids.extend(catalog.client_job_ids(pool, &client)?);
                    }
                }
                ids
            }
            SelectionType::Job => {
                let re = self.regex()?;
                let mut ids = Vec::new();
                for name in catalog.pool_job_names(pool)? {
                    if re.is_match(&name) {
                        ids.extend(catalog.named_job_ids(pool, &name)?);
                    }
                }
                ids
            }
            SelectionType::SqlQuery => {
                catalog.query_job_ids(self.pattern.as_deref().unwrap_or_default())?
            }
            SelectionType::PoolOccupancy => {
                let resource = self.pool_resource(config)?;
                select_by_occupancy(
                    catalog,
                    catalog.pool_volumes(pool)?,
                    resource.migration_high_bytes,
                    resource.migration_low_bytes,
                )?
            }
            SelectionType::PoolTime => {
                let resource = self.pool_resource(config)?;
                let age = Duration::seconds(resource.migration_time_secs.min(i64::MAX as u64) as i64);
                catalog.pool_job_ids_ended_before(pool, now - age)?
            }
            SelectionType::PoolUncopiedJobs => catalog.pool_uncopied_job_ids(pool)?,
        };

        let unique: BTreeSet<JobId> = ids.into_iter().collect();
        self.job_ids = unique.into_iter().collect();
        log::info!(
            "Selection {:?} on pool {} found {} job(s)",
            self.selection_type,
            self.pool,
            self.job_ids.len()
        );
        Ok(&self.job_ids)
    }
}

/// Picks jobs from the oldest-written volumes until the pool would drop to
/// the low-water mark. Nothing is picked below the high-water mark.
fn select_by_occupancy(
    catalog: &dyn Catalog,
    mut volumes: Vec<VolumeEntry>,
    high: u64,
    low: u64,
) -> Result<Vec<JobId>, SelectionError> {
    let mut remaining: u64 = volumes.iter().map(|v| v.bytes).sum();
    if remaining < high {
        log::info!(
            "Pool occupancy {} is below the migration high-water mark {}",
            remaining,
            high
        );
        return Ok(Vec::new());
    }

    volumes.sort_by(|a, b| {
        a.last_written
            .cmp(&b.last_written)
            .then_with(|| a.volume_name.cmp(&b.volume_name))
    });

    let mut picked = BTreeSet::new();
    'volumes: for volume in &volumes {
        for id in catalog.volume_job_ids(&volume.volume_name)? {
            if !picked.insert(id) {
                continue;
            }
            let bytes = catalog.get_job_record(id)?.bytes;
            remaining = remaining.saturating_sub(bytes);
            if remaining <= low {
                break 'volumes;
            }
        }
    }
    Ok(picked.into_iter().collect())
}

/// Runs the selection configured on `definition`.
pub fn select_job_ids(
    definition: &JobDefinition,
    config: &DirectorConfig,
    catalog: &dyn Catalog,
    now: DateTime<Utc>,
) -> Result<Vec<JobId>, SelectionError> {
    let mut ctx = SelectionContext::for_definition(definition)?;
    ctx.select(config, catalog, now)?;
    Ok(ctx.job_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{JobMedia, VolumeParams};
    use crate::catalog::{JobEntry, MemoryCatalog};
    use crate::config::{DirectorSettings, SelectionConfig};
    use crate::job::JobType;

    fn config() -> DirectorConfig {
        DirectorConfig {
            version: "1.0".to_string(),
            director: DirectorSettings::new("bdir"),
            clients: vec![],
            storages: vec![],
            pools: vec![PoolResource {
                name: "Full".to_string(),
                storage: None,
                next_pool: Some("Copy".to_string()),
                migration_high_bytes: 300,
                migration_low_bytes: 100,
                migration_time_secs: 36_000,
            }],
            jobs: vec![],
        }
    }

    fn definition(selection_type: SelectionType, pattern: Option<&str>) -> JobDefinition {
        let mut def = JobDefinition::new("migrate-full", JobType::Migrate);
        def.pool = Some("Full".to_string());
        def.selection = Some(SelectionConfig {
            selection_type,
            pattern: pattern.map(str::to_string),
        });
        def
    }

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        let now = Utc::now();
        for (id, client, name, bytes, vol, age_h) in [
            (1, "web-fd", "web", 100, "Full-0001", 48),
            (2, "db-fd", "db", 100, "Full-0001", 30),
            (3, "web-fd", "web", 150, "Full-0002", 2),
        ] {
            catalog.insert_job(
                JobEntry::backup(JobId(id), name, client)
                    .in_pool("Full")
                    .with_size(10, bytes)
                    .ended_at(now - Duration::hours(age_h)),
            );
            catalog.insert_media(
                JobId(id),
                JobMedia {
                    vol_session_id: id,
                    vol_session_time: 1,
                    volumes: vec![VolumeParams::new(vol, "File", "File").with_indexes(1, 10)],
                },
            );
        }
        catalog.insert_volume(VolumeEntry {
            volume_name: "Full-0001".to_string(),
            pool: "Full".to_string(),
            media_type: "File".to_string(),
            storage: "File".to_string(),
            bytes: 200,
            last_written: now - Duration::hours(30),
        });
        catalog.insert_volume(VolumeEntry {
            volume_name: "Full-0002".to_string(),
            pool: "Full".to_string(),
            media_type: "File".to_string(),
            storage: "File".to_string(),
            bytes: 150,
            last_written: now - Duration::hours(2),
        });
        catalog
    }

    fn select(t: SelectionType, pattern: Option<&str>) -> Vec<JobId> {
        select_job_ids(&definition(t, pattern), &config(), &catalog(), Utc::now()).unwrap()
    }

    #[test]
    fn test_client_regex() {
        assert_eq!(select(SelectionType::Client, Some("^web")), vec![JobId(1), JobId(3)]);
    }

    #[test]
    fn test_volume_policies() {
        assert_eq!(select(SelectionType::SmallestVolume, None), vec![JobId(3)]);
        assert_eq!(select(SelectionType::OldestVolume, None), vec![JobId(1), JobId(2)]);
        assert_eq!(
            select(SelectionType::Volume, Some("Full-.*")),
            vec![JobId(1), JobId(2), JobId(3)]
        );
    }

    #[test]
    fn test_pool_time() {
        assert_eq!(select(SelectionType::PoolTime, None), vec![JobId(1), JobId(2)]);
    }

    #[test]
    fn test_pool_occupancy_stops_at_low_water() {
        // 350 bytes in the pool; jobs 1 and 2 bring it to 150, job 3 is needed
        // to reach the low-water mark of 100.
        assert_eq!(
            select(SelectionType::PoolOccupancy, None),
            vec![JobId(1), JobId(2), JobId(3)]
        );
    }

    #[test]
    fn test_pool_occupancy_below_high_water_selects_nothing() {
        let mut config = config();
        config.pools[0].migration_high_bytes = 1000;
        let ids = select_job_ids(
            &definition(SelectionType::PoolOccupancy, None),
            &config,
            &catalog(),
            Utc::now(),
        )
        .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_missing_pattern_is_rejected() {
        let err = select_job_ids(
            &definition(SelectionType::Job, None),
            &config(),
            &catalog(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SelectionError::MissingPattern(_)));
    }

    #[test]
    fn test_sql_query() {
        let catalog = catalog();
        catalog.insert_query("SELECT 2", vec![JobId(2), JobId(2)]);
        let ids = select_job_ids(
            &definition(SelectionType::SqlQuery, Some("SELECT 2")),
            &config(),
            &catalog,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ids, vec![JobId(2)]);
    }
}

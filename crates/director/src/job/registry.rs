//! Registry of live jobs, shared by handle between the queue and the watchdog.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::job::record::{JobHandle, JobId, JobSnapshot};

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<BTreeMap<JobId, JobHandle>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<JobId, JobHandle>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("JobRegistry read lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<JobId, JobHandle>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("JobRegistry write lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn register(&self, job: JobHandle) {
        self.write().insert(job.id(), job);
    }

    pub fn unregister(&self, id: JobId) -> Option<JobHandle> {
        self.write().remove(&id)
    }

    pub fn get(&self, id: JobId) -> Option<JobHandle> {
        self.read().get(&id).cloned()
    }

    /// Handles of every live job, in job id order.
    pub fn jobs(&self) -> Vec<JobHandle> {
        self.read().values().cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs().iter().map(|j| j.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobDefinition;
    use crate::events::JobEventBroadcaster;
    use crate::job::{JobRecord, JobRequest, JobType};

    fn handle(id: u32) -> JobHandle {
        let def = Arc::new(JobDefinition::new("admin", JobType::Admin));
        Arc::new(JobRecord::new(
            JobId(id),
            format!("admin.{}", id),
            id as u64,
            JobRequest::from_definition(def),
            JobEventBroadcaster::default(),
        ))
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = JobRegistry::new();
        registry.register(handle(2));
        registry.register(handle(1));
        assert_eq!(registry.len(), 2);

        let ids: Vec<JobId> = registry.jobs().iter().map(|j| j.id()).collect();
        assert_eq!(ids, vec![JobId(1), JobId(2)]);

        assert!(registry.unregister(JobId(1)).is_some());
        assert!(registry.get(JobId(1)).is_none());
        assert!(registry.get(JobId(2)).is_some());
    }

    #[test]
    fn test_handle_outlives_registry_entry() {
        let registry = JobRegistry::new();
        registry.register(handle(7));
        let held = registry.get(JobId(7)).unwrap();
        registry.unregister(JobId(7));
        assert_eq!(held.id(), JobId(7));
        assert!(registry.is_empty());
    }
}

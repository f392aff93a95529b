//! Console-facing facade: owns the queue and the watchdog and exposes the
//! run/cancel/status/restore operations.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::agent::AgentConnector;
use crate::bootstrap::BootstrapRecord;
use crate::catalog::Catalog;
use crate::config::{DirectorConfig, JobDefinition};
use crate::error::{AdmissionError, BootstrapError, CatalogError, DirectorError, Result, TreeError};
use crate::events::{JobEvent, JobEventBroadcaster};
use crate::job::{
    JobId, JobPayload, JobRegistry, JobRequest, JobSnapshot, JobSummary, JobType, Services,
};
use crate::scheduler::{JobQueue, Watchdog};
use crate::tree::{ListEntry, RestoreTree};

/// How often the dispatcher re-checks jobs waiting for their start time.
const DISPATCH_TICK: Duration = Duration::from_secs(1);

pub struct Director {
    config: Arc<DirectorConfig>,
    queue: JobQueue,
    watchdog: Watchdog,
    watchdog_handle: Mutex<Option<JoinHandle<()>>>,
    events: JobEventBroadcaster,
}

impl Director {
    /// Builds the queue; fails when the catalog can't report its highest job id.
    pub fn new(
        config: DirectorConfig,
        catalog: Arc<dyn Catalog>,
        agents: Arc<dyn AgentConnector>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let events = JobEventBroadcaster::default();
        let services = Arc::new(Services {
            config: Arc::clone(&config),
            catalog,
            agents,
            events: events.clone(),
        });
        let queue = JobQueue::new(services, JobRegistry::new())?;
        let interval = Duration::from_secs(config.director.watchdog_interval_secs.max(1));
        let watchdog = Watchdog::new(queue.clone(), interval);
        Ok(Self {
            config,
            queue,
            watchdog,
            watchdog_handle: Mutex::new(None),
            events,
        })
    }

    /// Creates the working directory and starts the dispatcher and watchdog threads.
    pub fn start(&self) -> Result<()> {
        let workdir = &self.config.director.working_directory;
        std::fs::create_dir_all(workdir).map_err(|source| DirectorError::Startup {
            what: "working directory",
            source,
        })?;
        self.queue
            .start_dispatcher(DISPATCH_TICK)
            .map_err(|source| DirectorError::Startup {
                what: "job dispatcher",
                source,
            })?;
        let handle = self.watchdog.start().map_err(|source| DirectorError::Startup {
            what: "watchdog",
            source,
        })?;
        match self.watchdog_handle.lock() {
            Ok(mut g) => *g = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
        log::info!(
            "Director {} started (max {} concurrent jobs, working directory {})",
            self.config.director.name,
            self.config.director.max_concurrent_jobs,
            workdir.display()
        );
        Ok(())
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn definition(&self, name: &str) -> std::result::Result<Arc<JobDefinition>, AdmissionError> {
        self.config
            .job(name)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| AdmissionError::UnknownJobDefinition(name.to_string()))
    }

    /// A request prefilled from the named job definition.
    pub fn request(&self, name: &str) -> std::result::Result<JobRequest, AdmissionError> {
        Ok(JobRequest::from_definition(self.definition(name)?))
    }

    /// Runs the named job definition with its configured defaults.
    pub fn run(&self, name: &str) -> std::result::Result<JobId, AdmissionError> {
        self.submit(self.request(name)?)
    }

    pub fn submit(&self, request: JobRequest) -> std::result::Result<JobId, AdmissionError> {
        self.queue.submit(request)
    }

    pub fn cancel(&self, id: JobId) -> bool {
        self.queue.cancel(id)
    }

    /// Live status of a waiting or running job.
    pub fn status(&self, id: JobId) -> Option<JobSnapshot> {
        self.queue.status(id)
    }

    pub fn list(&self) -> Vec<JobSnapshot> {
        self.queue.list()
    }

    pub fn history(&self) -> Vec<JobSummary> {
        self.queue.history()
    }

    pub fn summary(&self, id: JobId) -> Option<JobSummary> {
        self.queue.summary(id)
    }

    pub fn wait_for(&self, id: JobId, timeout: Duration) -> Option<JobSummary> {
        self.queue.wait_for(id, timeout)
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_idle(timeout)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Opens a restore selection over the files of `job_ids`.
    pub fn restore(&self, job_ids: &[JobId]) -> std::result::Result<RestoreSession<'_>, CatalogError> {
        let catalog = Arc::clone(&self.queue.services().catalog);
        let tree = RestoreTree::from_catalog(catalog.as_ref(), job_ids)?;
        Ok(RestoreSession {
            director: self,
            job_ids: job_ids.to_vec(),
            tree,
            file_regex: None,
            client: None,
        })
    }

    /// Stops the watchdog, cancels every live job and joins all threads.
    pub fn shutdown(&self) {
        log::info!("Shutting down director {}...", self.config.director.name);
        self.watchdog.stop();
        let handle = match self.watchdog_handle.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Watchdog thread panicked");
            }
        }
        self.queue.shutdown();
        log::info!("Director shutdown complete");
    }
}

/// An interactive restore selection: a tree to mark files in, turned into a
/// restore job on submit.
pub struct RestoreSession<'a> {
    director: &'a Director,
    job_ids: Vec<JobId>,
    tree: RestoreTree,
    file_regex: Option<String>,
    client: Option<String>,
}

impl<'a> RestoreSession<'a> {
    pub fn job_ids(&self) -> &[JobId] {
        &self.job_ids
    }

    pub fn tree(&self) -> &RestoreTree {
        &self.tree
    }

    pub fn mark(&mut self, pattern: &str) -> std::result::Result<usize, TreeError> {
        self.tree.mark(pattern)
    }

    pub fn unmark(&mut self, pattern: &str) -> std::result::Result<usize, TreeError> {
        self.tree.unmark(pattern)
    }

    pub fn cd(&mut self, path: &str) -> std::result::Result<String, TreeError> {
        self.tree.cd(path)
    }

    pub fn pwd(&self) -> String {
        self.tree.pwd()
    }

    pub fn ls(&self) -> Vec<ListEntry> {
        self.tree.ls()
    }

    pub fn marked_count(&self) -> usize {
        self.tree.marked_count()
    }

    /// Only files whose names match `pattern` are extracted.
    pub fn set_file_regex(&mut self, pattern: &str) -> std::result::Result<(), BootstrapError> {
        regex::Regex::new(pattern).map_err(|e| BootstrapError::InvalidFileRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.file_regex = Some(pattern.to_string());
        Ok(())
    }

    /// Restores to another client than the definition's.
    pub fn restore_client(&mut self, client: &str) {
        self.client = Some(client.to_string());
    }

    /// The bootstrap the current marks translate to.
    pub fn bootstrap(&self) -> std::result::Result<BootstrapRecord, BootstrapError> {
        let mut bsr = BootstrapRecord::new();
        let selected = self.tree.add_to_bootstrap(&mut bsr);
        log::debug!("{} file indexes selected for restore", selected);
        if let Some(pattern) = &self.file_regex {
            for job_id in bsr.job_ids() {
                bsr.set_file_regex(job_id, pattern)?;
            }
        }
        Ok(bsr)
    }

    /// Submits a restore through the named restore job definition.
    pub fn submit(self, job_name: &str) -> Result<JobId> {
        let director = self.director;
        let definition = director.definition(job_name)?;
        if definition.job_type != JobType::Restore {
            return Err(AdmissionError::MalformedSelection(format!(
                "job '{}' is not a restore job",
                job_name
            ))
            .into());
        }
        let bootstrap = self.bootstrap()?;
        let mut request = JobRequest::from_definition(definition).with_payload(JobPayload::Restore {
            bootstrap,
            tree: Some(self.tree),
        });
        if let Some(client) = self.client {
            request.client = Some(client);
        }
        Ok(director.submit(request)?)
    }
}

impl Drop for Director {
    fn drop(&mut self) {
        if !self.queue.is_closed() {
            self.shutdown();
        }
    }
}

//! Admission queue: every admission decision runs under one lock, and each
//! admitted job gets its own worker thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::config::DirectorConfig;
use crate::error::{AdmissionError, CatalogError};
use crate::job::{
    JobContext, JobHandle, JobId, JobNamer, JobPayload, JobRecord, JobRegistry, JobRequest,
    JobSnapshot, JobStatus, JobSummary, JobType, Services,
};
use crate::scheduler::duplicate::{self, Decision};
use crate::scheduler::worker;

struct QueueState {
    next_id: u32,
    seq: u64,
    /// Kept in (priority, submission) order.
    waiting: Vec<JobHandle>,
    running: Vec<JobHandle>,
    workers: HashMap<JobId, JoinHandle<()>>,
    history: VecDeque<JobSummary>,
    closed: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    changed: Condvar,
    registry: JobRegistry,
    services: Arc<Services>,
    namer: JobNamer,
    bootstrap_seq: AtomicU32,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    shutdown: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("JobQueue")
            .field("waiting", &state.waiting.len())
            .field("running", &state.running.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Storages a job occupies: its own, else its pool's.
fn storages_of(job: &JobRecord, config: &DirectorConfig) -> Vec<String> {
    if !job.storages().is_empty() {
        return job.storages().to_vec();
    }
    job.pool()
        .and_then(|p| config.pool(p))
        .and_then(|p| p.storage.clone())
        .into_iter()
        .collect()
}

impl JobQueue {
    /// Job ids continue after the highest one in the catalog.
    pub fn new(services: Arc<Services>, registry: JobRegistry) -> Result<Self, CatalogError> {
        let highest = services.catalog.highest_job_id()?;
        let (wake_tx, wake_rx) = unbounded();
        Ok(Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    next_id: highest.0 + 1,
                    seq: 0,
                    waiting: Vec::new(),
                    running: Vec::new(),
                    workers: HashMap::new(),
                    history: VecDeque::new(),
                    closed: false,
                }),
                changed: Condvar::new(),
                registry,
                services,
                namer: JobNamer::new(),
                bootstrap_seq: AtomicU32::new(1),
                wake_tx,
                wake_rx,
                shutdown: AtomicBool::new(false),
                dispatcher: Mutex::new(None),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.shared.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Job queue lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn config(&self) -> &DirectorConfig {
        &self.shared.services.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.shared.registry
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.shared.services
    }

    /// Numbers this director's bootstrap files.
    pub(crate) fn bootstrap_seq(&self) -> &AtomicU32 {
        &self.shared.bootstrap_seq
    }

    /// Starts the thread that re-evaluates waiting jobs every `tick`, so that
    /// jobs scheduled in the future start on time.
    pub fn start_dispatcher(&self, tick: Duration) -> std::io::Result<()> {
        let queue = self.clone();
        let handle = thread::Builder::new()
            .name("job-dispatcher".to_string())
            .spawn(move || {
                debug!("Job dispatcher started");
                loop {
                    if queue.shared.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    match queue.shared.wake_rx.recv_timeout(tick) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if queue.shared.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    queue.pump();
                }
                debug!("Job dispatcher stopped");
            })?;
        match self.shared.dispatcher.lock() {
            Ok(mut g) => *g = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
        Ok(())
    }

    fn validate(&self, request: &JobRequest) -> Result<(), AdmissionError> {
        let config = self.config();
        let missing = |kind: &'static str, name: &str| AdmissionError::ResourceMissing {
            kind,
            name: name.to_string(),
        };
        if let Some(client) = &request.client {
            if config.client(client).is_none() {
                return Err(missing("Client", client));
            }
        }
        if let Some(pool) = &request.pool {
            if config.pool(pool).is_none() {
                return Err(missing("Pool", pool));
            }
        }
        for storage in &request.storages {
            if config.storage(storage).is_none() {
                return Err(missing("Storage", storage));
            }
        }
        let is_control = matches!(request.job_type, JobType::Migrate | JobType::Copy)
            && !matches!(request.payload, JobPayload::Migrate { .. });
        if is_control {
            match &request.definition.selection {
                None => {
                    return Err(AdmissionError::MalformedSelection(format!(
                        "job '{}' has no selection",
                        request.definition.name
                    )))
                }
                Some(sel) if sel.selection_type.needs_pattern() && sel.pattern.is_none() => {
                    return Err(AdmissionError::MalformedSelection(format!(
                        "selection {:?} of job '{}' needs a pattern",
                        sel.selection_type, request.definition.name
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn allocate(&self, state: &mut QueueState, request: JobRequest) -> JobHandle {
        let id = JobId(state.next_id);
        state.next_id += 1;
        state.seq += 1;
        let name = self.shared.namer.next_name(&request.definition.name);
        let job = Arc::new(JobRecord::new(
            id,
            name,
            state.seq,
            request,
            self.shared.services.events.clone(),
        ));
        self.shared.registry.register(Arc::clone(&job));
        job
    }

    /// Admits a job. Errors leave no trace: no id is allocated.
    pub fn submit(&self, request: JobRequest) -> Result<JobId, AdmissionError> {
        self.validate(&request)?;
        let now = Utc::now();

        let mut state = self.lock();
        if state.closed {
            return Err(AdmissionError::QueueClosed);
        }

        let live: Vec<JobHandle> = state
            .waiting
            .iter()
            .chain(state.running.iter())
            .cloned()
            .collect();
        match duplicate::allow(&request, &live, now) {
            Decision::Reject { existing } => {
                return Err(AdmissionError::DuplicateRejected {
                    job: request.definition.name.clone(),
                    existing,
                });
            }
            Decision::Allow { cancel } => {
                for job in cancel {
                    self.cancel_locked(&mut state, &job);
                }
            }
        }

        let job = self.allocate(&mut state, request);
        let id = job.id();
        info!(
            "Queued {} JobId {} ({}), priority {}",
            job.job_type(),
            id,
            job.name(),
            job.priority()
        );
        state.waiting.push(job);
        state
            .waiting
            .sort_by_key(|j| (j.priority(), j.seq()));
        self.pump_locked(&mut state, now);
        self.shared.changed.notify_all();
        Ok(id)
    }

    /// Creates a job that runs outside the queue, driven by another job's
    /// worker. It is live (visible to status queries and the watchdog) until
    /// [`release_linked`](Self::release_linked).
    pub fn register_linked(&self, request: JobRequest) -> Result<JobHandle, AdmissionError> {
        self.validate(&request)?;
        let mut state = self.lock();
        if state.closed {
            return Err(AdmissionError::QueueClosed);
        }
        let job = self.allocate(&mut state, request);
        debug!("Registered linked JobId {} ({})", job.id(), job.name());
        Ok(job)
    }

    pub fn release_linked(&self, id: JobId) {
        let mut state = self.lock();
        if let Some(job) = self.shared.registry.get(id) {
            self.retire_locked(&mut state, &job);
        }
        self.shared.changed.notify_all();
    }

    /// Cancels a job wherever it is. A waiting job is dropped from the queue
    /// at once; a running job is signaled and frees its slot when its worker
    /// unwinds.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut state = self.lock();
        let job = state
            .waiting
            .iter()
            .chain(state.running.iter())
            .find(|j| j.id() == id)
            .cloned()
            .or_else(|| self.shared.registry.get(id));
        let Some(job) = job else {
            debug!("Cancel: JobId {} is not live", id);
            return false;
        };
        let canceled = self.cancel_locked(&mut state, &job);
        if canceled {
            self.pump_locked(&mut state, Utc::now());
        }
        self.shared.changed.notify_all();
        canceled
    }

    fn cancel_locked(&self, state: &mut QueueState, job: &JobHandle) -> bool {
        let canceled = job.cancel();
        if let Some(pos) = state.waiting.iter().position(|j| j.id() == job.id()) {
            let job = state.waiting.remove(pos);
            info!("JobId {} canceled before it started", job.id());
            self.retire_locked(state, &job);
        } else if canceled {
            info!("JobId {} canceled", job.id());
        }
        canceled
    }

    /// Called by a worker once its job is terminal.
    pub(crate) fn finish(&self, id: JobId) {
        let mut state = self.lock();
        if let Some(pos) = state.running.iter().position(|j| j.id() == id) {
            let job = state.running.remove(pos);
            self.retire_locked(&mut state, &job);
        }
        // The calling thread is the worker itself.
        state.workers.remove(&id);
        self.pump_locked(&mut state, Utc::now());
        self.shared.changed.notify_all();
    }

    fn retire_locked(&self, state: &mut QueueState, job: &JobHandle) {
        let summary = JobSummary::from_record(job);
        info!("{}", summary.termination());
        debug!("\n{}", summary);
        state.history.push_back(summary);
        let limit = self.config().director.history_size.max(1);
        while state.history.len() > limit {
            state.history.pop_front();
        }
        self.shared.registry.unregister(job.id());
    }

    /// Re-evaluates waiting jobs, e.g. after a scheduled start time passed.
    pub fn pump(&self) {
        let mut state = self.lock();
        self.pump_locked(&mut state, Utc::now());
        self.shared.changed.notify_all();
    }

    fn pump_locked(&self, state: &mut QueueState, now: DateTime<Utc>) {
        let waiting = std::mem::take(&mut state.waiting);
        let mut still_waiting = Vec::with_capacity(waiting.len());
        let mut blocked_priority: Option<u32> = None;

        for job in waiting {
            if job.status().is_terminal() {
                self.retire_locked(state, &job);
                continue;
            }
            match self.blocking_status(&state.running, &job, now, blocked_priority) {
                Some(wait) => {
                    if job.status() != wait {
                        debug!("JobId {} is {}", job.id(), wait);
                    }
                    job.set_status_at(wait, now);
                    if wait != JobStatus::WaitingStartTime {
                        blocked_priority.get_or_insert(job.priority());
                    }
                    still_waiting.push(job);
                }
                None => self.launch(state, job, now),
            }
        }
        state.waiting = still_waiting;
    }

    /// The waiting state `job` must stay in, or `None` when it may run.
    fn blocking_status(
        &self,
        running: &[JobHandle],
        job: &JobRecord,
        now: DateTime<Utc>,
        blocked_priority: Option<u32>,
    ) -> Option<JobStatus> {
        let config = self.config();

        if job.lock().timing.scheduled_at > now {
            return Some(JobStatus::WaitingStartTime);
        }

        if blocked_priority.is_some_and(|p| p < job.priority()) {
            return Some(JobStatus::WaitingPriority);
        }
        let mixed = job.definition().allow_mixed_priority;
        if running
            .iter()
            .any(|r| r.priority() != job.priority() && !(mixed && r.definition().allow_mixed_priority))
        {
            return Some(JobStatus::WaitingPriority);
        }

        if running.len() >= config.director.max_concurrent_jobs {
            return Some(JobStatus::WaitingMaxJobs);
        }
        let same_definition = running
            .iter()
            .filter(|r| r.definition().name == job.definition().name)
            .count();
        if same_definition >= job.definition().max_concurrent_jobs.max(1) {
            return Some(JobStatus::WaitingMaxJobs);
        }
        if let Some(client) = job.client().and_then(|c| config.client(c)) {
            let on_client = running
                .iter()
                .filter(|r| r.client() == Some(client.name.as_str()))
                .count();
            if on_client >= client.max_concurrent_jobs.max(1) {
                return Some(JobStatus::WaitingMaxJobs);
            }
        }

        for name in storages_of(job, config) {
            let Some(storage) = config.storage(&name) else {
                continue;
            };
            let on_storage = running
                .iter()
                .filter(|r| storages_of(r, config).contains(&name))
                .count();
            if on_storage >= storage.max_concurrent_jobs.max(1) {
                return Some(JobStatus::WaitingOnResource);
            }
        }
        None
    }

    fn launch(&self, state: &mut QueueState, job: JobHandle, now: DateTime<Utc>) {
        job.set_status_at(JobStatus::Running, now);
        let ctx = JobContext {
            job: Arc::clone(&job),
            services: Arc::clone(&self.shared.services),
            queue: self.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("job-{}", job.id()))
            .spawn(move || worker::run_job(ctx));
        match spawned {
            Ok(handle) => {
                state.workers.insert(job.id(), handle);
                state.running.push(job);
            }
            Err(e) => {
                error!("JobId {}: failed to start worker: {}", job.id(), e);
                job.add_message(format!("Failed to start worker thread: {}", e));
                job.set_status(JobStatus::FatalError);
                self.retire_locked(state, &job);
            }
        }
    }

    pub fn status(&self, id: JobId) -> Option<JobSnapshot> {
        self.shared.registry.get(id).map(|j| j.snapshot())
    }

    pub fn get(&self, id: JobId) -> Option<JobHandle> {
        self.shared.registry.get(id)
    }

    /// Every live job, waiting, running and linked, in id order.
    pub fn list(&self) -> Vec<JobSnapshot> {
        self.shared.registry.snapshot()
    }

    pub fn waiting(&self) -> Vec<JobHandle> {
        self.lock().waiting.clone()
    }

    pub fn running(&self) -> Vec<JobHandle> {
        self.lock().running.clone()
    }

    /// Summaries of finished jobs, oldest first.
    pub fn history(&self) -> Vec<JobSummary> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn summary(&self, id: JobId) -> Option<JobSummary> {
        self.lock().history.iter().rev().find(|s| s.job_id == id).cloned()
    }

    /// Blocks until job `id` has finished, up to `timeout`.
    pub fn wait_for(&self, id: JobId, timeout: Duration) -> Option<JobSummary> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(summary) = state.history.iter().rev().find(|s| s.job_id == id) {
                return Some(summary.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = match self.shared.changed.wait_timeout(state, remaining) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Blocks until nothing is waiting or running, up to `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.waiting.is_empty() && state.running.is_empty() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = match self.shared.changed.wait_timeout(state, remaining) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Refuses new submissions, cancels everything live and joins all
    /// threads.
    pub fn shutdown(&self) {
        info!("Shutting down job queue...");
        let workers: Vec<(JobId, JoinHandle<()>)> = {
            let mut state = self.lock();
            state.closed = true;
            let live: Vec<JobHandle> = state
                .waiting
                .iter()
                .chain(state.running.iter())
                .cloned()
                .collect();
            for job in live {
                self.cancel_locked(&mut state, &job);
            }
            for job in self.shared.registry.jobs() {
                job.cancel();
            }
            self.shared.changed.notify_all();
            state.workers.drain().collect()
        };

        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.shared.wake_tx.send(());
        let dispatcher = match self.shared.dispatcher.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = dispatcher {
            if handle.join().is_err() {
                error!("Job dispatcher panicked");
            }
        }

        for (id, handle) in workers {
            if handle.join().is_err() {
                error!("Worker for JobId {} panicked", id);
            } else {
                debug!("Worker for JobId {} finished", id);
            }
        }
        info!("Job queue stopped");
    }
}

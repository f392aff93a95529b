use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentConnection, AgentSignal};
use crate::bootstrap::BootstrapRecord;
use crate::config::JobDefinition;
use crate::events::{JobEvent, JobEventBroadcaster};
use crate::job::runner::JobKind;
use crate::job::status::JobStatus;
use crate::scheduler::CancelToken;
use crate::tree::RestoreTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u32);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for JobId {
    fn from(value: u32) -> Self {
        JobId(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Backup,
    Restore,
    Verify,
    Admin,
    Archive,
    Copy,
    Migrate,
    Consolidate,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            JobType::Backup => "Backup",
            JobType::Restore => "Restore",
            JobType::Verify => "Verify",
            JobType::Admin => "Admin",
            JobType::Archive => "Archive",
            JobType::Copy => "Copy",
            JobType::Migrate => "Migrate",
            JobType::Consolidate => "Consolidate",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLevel {
    Full,
    Incremental,
    Differential,
    VirtualFull,
    None,
}

impl std::fmt::Display for JobLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            JobLevel::Full => "Full",
            JobLevel::Incremental => "Incremental",
            JobLevel::Differential => "Differential",
            JobLevel::VirtualFull => "VirtualFull",
            JobLevel::None => "",
        };
        f.write_str(text)
    }
}

/// What a submission carries besides its definition.
#[derive(Debug, Default)]
pub enum JobPayload {
    #[default]
    None,
    Restore {
        bootstrap: BootstrapRecord,
        tree: Option<RestoreTree>,
    },
    Verify {
        target: Option<JobId>,
    },
    Migrate {
        source: JobId,
    },
    VirtualFull {
        job_ids: Vec<JobId>,
    },
}

/// A submission to the scheduler.
#[derive(Debug)]
pub struct JobRequest {
    pub definition: Arc<JobDefinition>,
    pub job_type: JobType,
    pub level: JobLevel,
    pub client: Option<String>,
    pub fileset: Option<String>,
    pub pool: Option<String>,
    pub storages: Vec<String>,
    pub priority: u32,
    pub scheduled_at: DateTime<Utc>,
    /// Skips the general duplicate check for this submission only.
    pub skip_duplicate_check: bool,
    /// Exempts the job from watchdog time limits.
    pub no_max_time: bool,
    pub payload: JobPayload,
}

impl JobRequest {
    pub fn from_definition(definition: Arc<JobDefinition>) -> Self {
        Self {
            job_type: definition.job_type,
            level: definition.level,
            client: definition.client.clone(),
            fileset: definition.fileset.clone(),
            pool: definition.pool.clone(),
            storages: definition.storage.clone(),
            priority: definition.priority,
            scheduled_at: Utc::now(),
            skip_duplicate_check: false,
            no_max_time: false,
            payload: JobPayload::None,
            definition,
        }
    }

    pub fn with_level(mut self, level: JobLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_at(mut self, when: DateTime<Utc>) -> Self {
        self.scheduled_at = when;
        self
    }

    pub fn with_payload(mut self, payload: JobPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn skip_duplicate_check(mut self, skip: bool) -> Self {
        self.skip_duplicate_check = skip;
        self
    }

    /// Always-incremental consolidation: a virtual full of an always-incremental job.
    pub fn is_consolidation(&self) -> bool {
        self.level == JobLevel::VirtualFull && self.definition.is_always_incremental()
    }
}

#[derive(Debug, Clone)]
pub struct JobTiming {
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub initial_scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    wait_started_at: Option<DateTime<Utc>>,
    wait_total: Duration,
}

impl JobTiming {
    fn new(now: DateTime<Utc>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            scheduled_at,
            initial_scheduled_at: scheduled_at,
            started_at: None,
            ended_at: None,
            wait_started_at: None,
            wait_total: Duration::zero(),
        }
    }

    /// Total time spent in waiting states up to `now`.
    pub fn waited(&self, now: DateTime<Utc>) -> Duration {
        match self.wait_started_at {
            Some(since) => self.wait_total + (now - since),
            None => self.wait_total,
        }
    }
}

/// An open connection to a remote agent, remembered so cancellation can reach it.
#[derive(Clone)]
pub struct AgentLink {
    pub connection: Arc<dyn AgentConnection>,
    pub io_thread: ThreadId,
}

impl std::fmt::Debug for AgentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLink")
            .field("agent", &self.connection.agent_name())
            .field("io_thread", &self.io_thread)
            .finish()
    }
}

/// Mutable job state, guarded by the per-job lock.
#[derive(Debug)]
pub struct JobState {
    pub status: JobStatus,
    pub timing: JobTiming,
    pub bootstrap: Option<BootstrapRecord>,
    pub bootstrap_path: Option<PathBuf>,
    pub tree: Option<RestoreTree>,
    pub mover: Option<JobHandle>,
    pub agents: Vec<AgentLink>,
    pub files: u64,
    pub bytes: u64,
    pub errors: u32,
    pub warnings: u32,
    pub volumes: Vec<String>,
    pub messages: Vec<String>,
}

impl JobState {
    /// Applies a status change; returns false when the transition rule refuses it.
    pub fn set_status(&mut self, next: JobStatus, now: DateTime<Utc>) -> bool {
        if self.status == next || !self.status.can_transition_to(next) {
            return false;
        }

        let was_waiting = self.status.is_waiting();
        let will_wait = next.is_waiting();
        if was_waiting && !will_wait {
            if let Some(since) = self.timing.wait_started_at.take() {
                self.timing.wait_total = self.timing.wait_total + (now - since);
            }
        } else if !was_waiting && will_wait {
            self.timing.wait_started_at = Some(now);
        }

        if next == JobStatus::Running && self.timing.started_at.is_none() {
            self.timing.started_at = Some(now);
        }
        if next.is_terminal() && self.timing.ended_at.is_none() {
            self.timing.ended_at = Some(now);
        }

        self.status = next;
        true
    }
}

pub type JobHandle = Arc<JobRecord>;

/// Per-job state container shared by the scheduler, the worker, the watchdog
/// and console handles. Dropped with its last handle.
pub struct JobRecord {
    id: JobId,
    name: String,
    definition: Arc<JobDefinition>,
    job_type: JobType,
    level: JobLevel,
    client: Option<String>,
    fileset: Option<String>,
    pool: Option<String>,
    storages: Vec<String>,
    priority: u32,
    skip_duplicate_check: bool,
    no_max_time: bool,
    seq: u64,
    state: Mutex<JobState>,
    kind: Mutex<Option<JobKind>>,
    cancel: CancelToken,
    events: JobEventBroadcaster,
}

impl std::fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("job_type", &self.job_type)
            .field("level", &self.level)
            .field("status", &self.status())
            .finish()
    }
}

impl JobRecord {
    pub fn new(
        id: JobId,
        name: String,
        seq: u64,
        request: JobRequest,
        events: JobEventBroadcaster,
    ) -> Self {
        let now = Utc::now();
        let kind = JobKind::for_request(&request);
        let (bootstrap, tree) = match request.payload {
            JobPayload::Restore { bootstrap, tree } => (Some(bootstrap), tree),
            _ => (None, None),
        };

        Self {
            id,
            name,
            definition: request.definition,
            job_type: request.job_type,
            level: request.level,
            client: request.client,
            fileset: request.fileset,
            pool: request.pool,
            storages: request.storages,
            priority: request.priority,
            skip_duplicate_check: request.skip_duplicate_check,
            no_max_time: request.no_max_time,
            seq,
            state: Mutex::new(JobState {
                status: JobStatus::Created,
                timing: JobTiming::new(now, request.scheduled_at),
                bootstrap,
                bootstrap_path: None,
                tree,
                mover: None,
                agents: Vec::new(),
                files: 0,
                bytes: 0,
                errors: 0,
                warnings: 0,
                volumes: Vec::new(),
                messages: Vec::new(),
            }),
            kind: Mutex::new(Some(kind)),
            cancel: CancelToken::new(),
            events,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Arc<JobDefinition> {
        &self.definition
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn level(&self) -> JobLevel {
        self.level
    }

    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }

    pub fn fileset(&self) -> Option<&str> {
        self.fileset.as_deref()
    }

    pub fn pool(&self) -> Option<&str> {
        self.pool.as_deref()
    }

    pub fn storages(&self) -> &[String] {
        &self.storages
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Submission order, used to break priority ties.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn skips_duplicate_check(&self) -> bool {
        self.skip_duplicate_check
    }

    pub fn ignores_duplicates(&self) -> bool {
        self.definition.duplicates.ignore_duplicate_checking
    }

    pub fn is_consolidation(&self) -> bool {
        self.level == JobLevel::VirtualFull && self.definition.is_always_incremental()
    }

    pub fn enforces_max_time(&self) -> bool {
        !self.no_max_time && !self.definition.limits.is_unlimited()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Takes the per-job lock.
    pub fn lock(&self) -> MutexGuard<'_, JobState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job {} state lock was poisoned, recovering", self.id);
                poisoned.into_inner()
            }
        }
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn set_status(&self, next: JobStatus) -> bool {
        self.set_status_at(next, Utc::now())
    }

    pub fn set_status_at(&self, next: JobStatus, now: DateTime<Utc>) -> bool {
        let changed = self.lock().set_status(next, now);
        if changed {
            self.events.send(JobEvent::status_change(self, next, now));
        }
        changed
    }

    pub fn add_message(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("JobId {}: {}", self.id, message);
        self.lock().messages.push(message);
    }

    pub(crate) fn take_kind(&self) -> Option<JobKind> {
        match self.kind.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Registers an open agent connection, owned by the calling thread.
    pub fn attach_agent(&self, connection: Arc<dyn AgentConnection>) {
        self.lock().agents.push(AgentLink {
            connection,
            io_thread: std::thread::current().id(),
        });
    }

    pub fn detach_agents(&self) -> Vec<AgentLink> {
        std::mem::take(&mut self.lock().agents)
    }

    pub fn attach_mover(&self, mover: JobHandle) {
        self.lock().mover = Some(mover);
    }

    pub fn mover(&self) -> Option<JobHandle> {
        self.lock().mover.clone()
    }

    /// Cancels the job: marks it Canceled, trips its token and asks every open
    /// agent connection to terminate. A job that already completed
    /// successfully is left alone; a failed one is escalated to Canceled.
    /// Safe to call repeatedly and from any thread; returns true only for the
    /// call that actually canceled.
    pub fn cancel(&self) -> bool {
        let now = Utc::now();
        let me = std::thread::current().id();

        let (changed, mover) = {
            let mut state = self.lock();
            if state.status.is_success() {
                return false;
            }
            let changed = state.set_status(JobStatus::Canceled, now);
            let first = !self.cancel.is_cancelled();
            self.cancel.cancel();

            if first {
                for link in &state.agents {
                    if link.io_thread == me {
                        log::debug!(
                            "JobId {}: not signaling {} from its own I/O thread",
                            self.id,
                            link.connection.agent_name()
                        );
                        continue;
                    }
                    if let Err(e) = link.connection.signal(AgentSignal::Terminate) {
                        log::warn!(
                            "JobId {}: failed to signal {}: {}",
                            self.id,
                            link.connection.agent_name(),
                            e
                        );
                    }
                }
            }
            (changed, state.mover.clone())
        };

        if changed {
            self.events
                .send(JobEvent::status_change(self, JobStatus::Canceled, now));
        }
        if let Some(mover) = mover {
            mover.cancel();
        }
        changed
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        JobSnapshot {
            job_id: self.id,
            name: self.name.clone(),
            definition: self.definition.name.clone(),
            job_type: self.job_type,
            level: self.level,
            status: state.status,
            priority: self.priority,
            client: self.client.clone(),
            scheduled_at: state.timing.scheduled_at,
            started_at: state.timing.started_at,
            ended_at: state.timing.ended_at,
            files: state.files,
            bytes: state.bytes,
            errors: state.errors,
        }
    }
}

/// Point-in-time view of a job for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub name: String,
    pub definition: String,
    pub job_type: JobType,
    pub level: JobLevel,
    pub status: JobStatus,
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub files: u64,
    pub bytes: u64,
    pub errors: u32,
}

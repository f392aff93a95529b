//! Remote file and storage agents as seen from a job worker.
//!
//! Framing, authentication and TLS belong to the connector implementation.

pub mod simulated;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::job::{JobId, JobLevel, JobType};
use crate::scheduler::CancelToken;

pub use simulated::{AgentScript, SimulatedConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    File,
    Storage,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::File => write!(f, "File daemon"),
            AgentKind::Storage => write!(f, "Storage daemon"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSignal {
    Terminate,
    EndOfData,
}

/// What an agent is told when a job starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentJob {
    pub job_id: JobId,
    pub job_name: String,
    pub job_type: JobType,
    pub level: JobLevel,
}

/// Final tally reported by an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReport {
    pub files: u64,
    pub bytes: u64,
    pub errors: u32,
    pub warnings: u32,
    pub volumes: Vec<String>,
}

pub trait AgentConnector: Send + Sync {
    fn connect(
        &self,
        kind: AgentKind,
        name: &str,
        address: &str,
        cancel: &CancelToken,
    ) -> Result<Arc<dyn AgentConnection>, AgentError>;
}

/// An open session with one agent. Methods take `&self` so the watchdog can
/// signal while the worker is blocked in `wait_for_termination`.
pub trait AgentConnection: Send + Sync {
    fn agent_name(&self) -> &str;

    fn kind(&self) -> AgentKind;

    fn send_bootstrap(&self, bootstrap: &str) -> Result<(), AgentError>;

    fn start_job(&self, job: &AgentJob) -> Result<(), AgentError>;

    fn signal(&self, signal: AgentSignal) -> Result<(), AgentError>;

    /// Blocks until the agent finishes, fails, is told to terminate, or
    /// `cancel` fires.
    fn wait_for_termination(&self, cancel: &CancelToken) -> Result<AgentReport, AgentError>;
}

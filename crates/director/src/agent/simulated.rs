//! Scripted agents for tests and simulation mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{after, never, select, unbounded, Receiver, Sender};

use crate::agent::{AgentConnection, AgentConnector, AgentJob, AgentKind, AgentReport, AgentSignal};
use crate::error::AgentError;
use crate::scheduler::CancelToken;

/// How a simulated agent behaves.
#[derive(Debug, Clone, Default)]
pub struct AgentScript {
    pub files: u64,
    pub bytes: u64,
    pub errors: u32,
    pub warnings: u32,
    pub volumes: Vec<String>,
    /// Time the job takes before the agent reports.
    pub duration: Duration,
    /// Never finish on its own; only termination or cancellation ends the job.
    pub hang: bool,
    pub refuse_connect: Option<String>,
    pub fail_with: Option<String>,
}

impl AgentScript {
    pub fn finishing(files: u64, bytes: u64) -> Self {
        Self {
            files,
            bytes,
            ..Default::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn taking(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn on_volumes(mut self, volumes: &[&str]) -> Self {
        self.volumes = volumes.iter().map(|v| v.to_string()).collect();
        self
    }
}

#[derive(Default)]
struct Journal {
    connections: Vec<(AgentKind, String)>,
    signals: Vec<(String, AgentSignal)>,
    bootstraps: Vec<(String, String)>,
    started: Vec<(String, AgentJob)>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Hands out scripted connections and records every interaction.
#[derive(Default)]
pub struct SimulatedConnector {
    scripts: Mutex<HashMap<String, AgentScript>>,
    journal: Arc<Mutex<Journal>>,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the behavior of the agent called `name`; unscripted agents finish
    /// immediately with nothing transferred.
    pub fn script(&self, name: &str, script: AgentScript) {
        lock(&self.scripts).insert(name.to_string(), script);
    }

    pub fn connections(&self) -> Vec<(AgentKind, String)> {
        lock(&self.journal).connections.clone()
    }

    pub fn signals(&self) -> Vec<(String, AgentSignal)> {
        lock(&self.journal).signals.clone()
    }

    pub fn signals_for(&self, agent: &str) -> Vec<AgentSignal> {
        lock(&self.journal)
            .signals
            .iter()
            .filter(|(name, _)| name == agent)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn bootstraps(&self) -> Vec<(String, String)> {
        lock(&self.journal).bootstraps.clone()
    }

    pub fn started_jobs(&self) -> Vec<(String, AgentJob)> {
        lock(&self.journal).started.clone()
    }
}

impl AgentConnector for SimulatedConnector {
    fn connect(
        &self,
        kind: AgentKind,
        name: &str,
        address: &str,
        cancel: &CancelToken,
    ) -> Result<Arc<dyn AgentConnection>, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Canceled);
        }
        let script = lock(&self.scripts).get(name).cloned().unwrap_or_default();
        if let Some(reason) = &script.refuse_connect {
            return Err(AgentError::Connect {
                agent: name.to_string(),
                address: address.to_string(),
                reason: reason.clone(),
            });
        }

        lock(&self.journal)
            .connections
            .push((kind, name.to_string()));
        log::debug!("Connected to {} {} at {}", kind, name, address);

        let (terminate_tx, terminate_rx) = unbounded();
        Ok(Arc::new(SimulatedConnection {
            name: name.to_string(),
            kind,
            script,
            terminate_tx,
            terminate_rx,
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct SimulatedConnection {
    name: String,
    kind: AgentKind,
    script: AgentScript,
    terminate_tx: Sender<()>,
    terminate_rx: Receiver<()>,
    journal: Arc<Mutex<Journal>>,
}

impl AgentConnection for SimulatedConnection {
    fn agent_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn send_bootstrap(&self, bootstrap: &str) -> Result<(), AgentError> {
        lock(&self.journal)
            .bootstraps
            .push((self.name.clone(), bootstrap.to_string()));
        Ok(())
    }

    fn start_job(&self, job: &AgentJob) -> Result<(), AgentError> {
        lock(&self.journal)
            .started
            .push((self.name.clone(), job.clone()));
        Ok(())
    }

    fn signal(&self, signal: AgentSignal) -> Result<(), AgentError> {
        lock(&self.journal)
            .signals
            .push((self.name.clone(), signal));
        if signal == AgentSignal::Terminate {
            let _ = self.terminate_tx.send(());
        }
        Ok(())
    }

    fn wait_for_termination(&self, cancel: &CancelToken) -> Result<AgentReport, AgentError> {
        let timer = if self.script.hang {
            never()
        } else {
            after(self.script.duration)
        };

        select! {
            recv(self.terminate_rx) -> _ => {
                if cancel.is_cancelled() {
                    Err(AgentError::Canceled)
                } else {
                    Err(AgentError::Terminated {
                        agent: self.name.clone(),
                        reason: "terminated on request".to_string(),
                    })
                }
            }
            recv(cancel.signal()) -> _ => Err(AgentError::Canceled),
            recv(timer) -> _ => match &self.script.fail_with {
                Some(reason) => Err(AgentError::Terminated {
                    agent: self.name.clone(),
                    reason: reason.clone(),
                }),
                None => Ok(AgentReport {
                    files: self.script.files,
                    bytes: self.script.bytes,
                    errors: self.script.errors,
                    warnings: self.script.warnings,
                    volumes: self.script.volumes.clone(),
                }),
            },
        }
    }
}

//! Periodic max-time enforcement over every live job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::job::{JobId, JobRecord, JobStatus};
use crate::scheduler::JobQueue;

/// The ceiling a job ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    MaxWaitTime,
    MaxRunTime,
    MaxRunSchedTime,
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Timeout::MaxWaitTime => "Max Wait Time",
            Timeout::MaxRunTime => "Max Run Time",
            Timeout::MaxRunSchedTime => "Max Run Sched Time",
        })
    }
}

fn exceeded(elapsed: chrono::Duration, limit_secs: u64) -> bool {
    limit_secs > 0 && elapsed.num_seconds() > limit_secs.min(i64::MAX as u64) as i64
}

/// Checks the three timers of one job under its lock.
pub fn check(job: &JobRecord, now: DateTime<Utc>) -> Option<Timeout> {
    let limits = &job.definition().limits;
    if !job.enforces_max_time() || limits.is_unlimited() {
        return None;
    }
    let state = job.lock();
    if state.status == JobStatus::Canceled || state.status.is_terminal() {
        return None;
    }
    let timing = &state.timing;

    if exceeded(timing.waited(now), limits.max_wait_time) {
        return Some(Timeout::MaxWaitTime);
    }
    if state.status == JobStatus::Running {
        if let Some(started) = timing.started_at {
            if exceeded(now - started, limits.run_time_for(job.level())) {
                return Some(Timeout::MaxRunTime);
            }
        }
    }
    if exceeded(now - timing.initial_scheduled_at, limits.max_run_sched_time) {
        return Some(Timeout::MaxRunSchedTime);
    }
    None
}

pub struct Watchdog {
    queue: JobQueue,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Watchdog {
    pub fn new(queue: JobQueue, interval: Duration) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            queue,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// One pass over the registry; returns the ids it canceled.
    pub fn scan(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let _span = tracing::debug_span!("watchdog.scan").entered();
        let mut canceled = Vec::new();
        for job in self.queue.registry().jobs() {
            let Some(timeout) = check(&job, now) else {
                continue;
            };
            log::warn!(
                "JobId {} ({}) exceeded {}, canceling",
                job.id(),
                job.name(),
                timeout
            );
            job.add_message(format!("Fatal error: {} exceeded.", timeout));
            if self.queue.cancel(job.id()) {
                canceled.push(job.id());
            }
        }
        canceled
    }

    /// Starts the scan loop in a background thread.
    pub fn start(&self) -> std::io::Result<JoinHandle<()>> {
        let shutdown = Arc::clone(&self.shutdown);
        let wake_rx = self.wake_rx.clone();
        let interval = self.interval;
        let watchdog = Watchdog {
            queue: self.queue.clone(),
            interval,
            shutdown: Arc::clone(&shutdown),
            wake_tx: self.wake_tx.clone(),
            wake_rx: self.wake_rx.clone(),
        };

        std::thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                log::debug!("Watchdog started, interval {:?}", interval);
                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    match wake_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    let canceled = watchdog.scan(Utc::now());
                    if !canceled.is_empty() {
                        log::info!("Watchdog canceled {} job(s)", canceled.len());
                    }
                }
                log::debug!("Watchdog stopped");
            })
    }

    /// Signals the scan loop to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.wake_tx.try_send(());
    }
}

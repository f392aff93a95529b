//! Job lifecycle through a running director: supervision, cancellation,
//! events and shutdown.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::*;
use director::agent::{AgentScript, AgentSignal};
use director::config::{DuplicatePolicy, RunLimits};
use director::{AdmissionError, Director, JobId, JobStatus, JobType};

/// Waits until both agent sessions of a backup are attached.
fn wait_connected(director: &Director, id: JobId) {
    for _ in 0..500 {
        if director
            .queue()
            .get(id)
            .is_some_and(|j| j.lock().agents.len() == 2)
        {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("JobId {} never connected its agents", id);
}

fn terminations(h: &TestHarness, agent: &str) -> usize {
    h.agents
        .signals_for(agent)
        .into_iter()
        .filter(|s| *s == AgentSignal::Terminate)
        .count()
}

#[test]
fn test_watchdog_cancels_overrunning_job() {
    let h = TestHarness::new();
    h.agents.script("web-fd", AgentScript::hanging());
    let config = h
        .config()
        .watchdog_interval(1)
        .client("web-fd", 1)
        .storage("File", 1)
        .job(
            JobBuilder::backup("nightly", "web-fd", "File")
                .limits(RunLimits {
                    max_run_time: 1,
                    ..Default::default()
                })
                .build(),
        )
        .build();
    let director = h.director(config);

    let id = director.run("nightly").unwrap();
    let summary = finished(&director, id);
    assert_eq!(summary.status, JobStatus::Canceled);
    assert!(
        summary
            .messages
            .iter()
            .any(|m| m == "Fatal error: Max Run Time exceeded."),
        "messages: {:?}",
        summary.messages
    );
    assert_eq!(terminations(&h, "web-fd"), 1);
    assert_eq!(h.catalog.job(id).unwrap().status, JobStatus::Canceled);
    director.shutdown();
}

#[test]
fn test_watchdog_cancels_job_past_its_schedule() {
    let h = TestHarness::new();
    h.agents.script("web-fd", AgentScript::hanging());
    let config = h
        .config()
        .watchdog_interval(1)
        .client("web-fd", 1)
        .storage("File", 1)
        .job(
            JobBuilder::backup("nightly", "web-fd", "File")
                .limits(RunLimits {
                    max_run_sched_time: 1,
                    ..Default::default()
                })
                .build(),
        )
        .build();
    let director = h.director(config);

    let id = director.run("nightly").unwrap();
    let summary = finished(&director, id);
    assert_eq!(summary.status, JobStatus::Canceled);
    assert!(
        summary
            .messages
            .iter()
            .any(|m| m == "Fatal error: Max Run Sched Time exceeded."),
        "messages: {:?}",
        summary.messages
    );
    assert_eq!(h.catalog.job(id).unwrap().status, JobStatus::Canceled);
    director.shutdown();
}

#[test]
fn test_cancel_is_idempotent() {
    let h = TestHarness::new();
    h.agents.script("web-fd", AgentScript::hanging());
    let config = h
        .config()
        .client("web-fd", 1)
        .storage("File", 1)
        .job(JobBuilder::backup("nightly", "web-fd", "File").build())
        .build();
    let director = h.director(config);

    let id = director.run("nightly").unwrap();
    wait_connected(&director, id);
    assert!(director.cancel(id));
    director.cancel(id);

    assert_eq!(finished(&director, id).status, JobStatus::Canceled);
    assert!(!director.cancel(id));
    assert_eq!(terminations(&h, "web-fd"), 1);
    assert_eq!(terminations(&h, "File"), 1);
    assert!(!director.cancel(JobId(999)));
    director.shutdown();
}

#[test]
fn test_cancel_waiting_job_never_starts_it() {
    let h = TestHarness::new();
    let config = h
        .config()
        .client("web-fd", 1)
        .storage("File", 1)
        .job(JobBuilder::backup("nightly", "web-fd", "File").build())
        .build();
    let director = h.director(config);

    let later = director
        .request("nightly")
        .unwrap()
        .scheduled_at(Utc::now() + chrono::Duration::hours(1));
    let id = director.submit(later).unwrap();
    assert_eq!(director.status(id).unwrap().status, JobStatus::WaitingStartTime);

    assert!(director.cancel(id));
    let summary = finished(&director, id);
    assert_eq!(summary.status, JobStatus::Canceled);
    assert!(summary.started_at.is_none());
    assert!(h.agents.connections().is_empty());
    assert!(h.catalog.job(id).is_none());
    director.shutdown();
}

#[test]
fn test_status_events_are_broadcast() {
    let h = TestHarness::new();
    let config = h
        .config()
        .job(JobBuilder::new("cleanup", JobType::Admin).build())
        .build();
    let director = h.director(config);
    let mut events = director.subscribe();

    let id = director.run("cleanup").unwrap();
    assert_eq!(finished(&director, id).status, JobStatus::Terminated);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.job_id == id {
            seen.push(event.status);
        }
    }
    assert!(seen.contains(&JobStatus::Running), "events: {:?}", seen);
    assert_eq!(seen.last(), Some(&JobStatus::Terminated));
    director.shutdown();
}

#[test]
fn test_catalog_outage_fails_job() {
    let h = TestHarness::new();
    let config = h
        .config()
        .client("web-fd", 1)
        .storage("File", 1)
        .job(JobBuilder::backup("nightly", "web-fd", "File").build())
        .build();
    let director = h.director(config);

    h.catalog.set_unavailable(Some("database is locked"));
    let id = director.run("nightly").unwrap();
    let summary = finished(&director, id);
    assert_eq!(summary.status, JobStatus::FatalError);
    assert!(h.agents.connections().is_empty());

    h.catalog.set_unavailable(None);
    let retry = director.run("nightly").unwrap();
    assert_eq!(finished(&director, retry).status, JobStatus::Terminated);
    director.shutdown();
}

#[test]
fn test_unreachable_agent_is_fatal() {
    let h = TestHarness::new();
    h.agents.script(
        "web-fd",
        AgentScript {
            refuse_connect: Some("connection refused".to_string()),
            ..Default::default()
        },
    );
    let config = h
        .config()
        .client("web-fd", 1)
        .storage("File", 1)
        .job(JobBuilder::backup("nightly", "web-fd", "File").build())
        .build();
    let director = h.director(config);

    let id = director.run("nightly").unwrap();
    let summary = finished(&director, id);
    assert!(summary.status.is_terminal());
    assert!(!summary.status.is_success());
    assert!(summary.errors > 0);
    director.shutdown();
}

#[test]
fn test_history_is_bounded() {
    let h = TestHarness::new();
    let config = h
        .config()
        .history_size(2)
        .job(
            JobBuilder::new("cleanup", JobType::Admin)
                .max_concurrent_jobs(3)
                .duplicates(DuplicatePolicy {
                    allow_duplicate_jobs: true,
                    ..Default::default()
                })
                .build(),
        )
        .build();
    let director = h.director(config);

    let ids: Vec<JobId> = (0..3).map(|_| director.run("cleanup").unwrap()).collect();
    for id in &ids {
        director.wait_for(*id, JOB_TIMEOUT);
    }
    assert!(director.wait_idle(JOB_TIMEOUT));
    let history = director.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.status == JobStatus::Terminated));
    director.shutdown();
}

#[test]
fn test_shutdown_cancels_live_jobs_and_closes_queue() {
    let h = TestHarness::new();
    h.agents.script("web-fd", AgentScript::hanging());
    let config = h
        .config()
        .client("web-fd", 1)
        .storage("File", 1)
        .job(JobBuilder::backup("nightly", "web-fd", "File").build())
        .job(JobBuilder::new("cleanup", JobType::Admin).build())
        .build();
    let director = h.director(config);

    let running = director.run("nightly").unwrap();
    wait_for_status(&director, running, JobStatus::Running);
    let later = director
        .request("cleanup")
        .unwrap()
        .scheduled_at(Utc::now() + chrono::Duration::hours(1));
    let waiting = director.submit(later).unwrap();

    director.shutdown();
    assert!(director.list().is_empty());
    assert_eq!(director.summary(running).unwrap().status, JobStatus::Canceled);
    assert_eq!(director.summary(waiting).unwrap().status, JobStatus::Canceled);
    assert_eq!(director.run("cleanup"), Err(AdmissionError::QueueClosed));
}

//! Copy, migrate and consolidation control jobs against a seeded catalog.

mod common;

use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use common::*;
use director::agent::AgentScript;
use director::config::SelectionType;
use director::{Director, JobId, JobLevel, JobStatus, JobType};

fn two_tier(h: &TestHarness) -> ConfigBuilder {
    h.config()
        .client("web-fd", 5)
        .storage("File", 5)
        .storage("CopyFile", 5)
        .pool("Full", "File", Some("Offsite"))
        .pool("Offsite", "CopyFile", None)
}

fn run_to_idle(director: &Director, name: &str) -> JobId {
    let id = director.run(name).unwrap();
    assert!(director.wait_idle(JOB_TIMEOUT), "jobs still live");
    id
}

#[test]
fn test_copy_uncopied_jobs() {
    let h = TestHarness::new();
    for id in [3, 4] {
        h.seed_backup(
            SeedBackup::new(id, "nightly", "web-fd")
                .pool("Full")
                .files(&["/etc/hosts", "/etc/passwd"]),
        );
    }
    let config = two_tier(&h)
        .job(
            JobBuilder::new("offsite", JobType::Copy)
                .pool("Full")
                .selection(SelectionType::PoolUncopiedJobs, None)
                .build(),
        )
        .build();
    let director = h.director(config);

    let control = run_to_idle(&director, "offsite");
    assert_eq!(director.summary(control).unwrap().status, JobStatus::Terminated);

    let copies = h.catalog.copies();
    let sources: BTreeSet<JobId> = copies.iter().map(|(src, _)| *src).collect();
    assert_eq!(sources, BTreeSet::from([JobId(3), JobId(4)]));
    for (_, copy) in &copies {
        let entry = h.catalog.job(*copy).unwrap();
        assert_eq!(entry.job_type, JobType::Copy);
        assert_eq!(entry.pool.as_deref(), Some("Offsite"));
    }
    // Sources stay usable after a copy.
    assert!(!h.catalog.job(JobId(3)).unwrap().migrated);

    let children: Vec<_> = director
        .history()
        .into_iter()
        .filter(|s| s.job_id != control && s.job_type == JobType::Copy)
        .collect();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|s| s.status == JobStatus::Terminated));

    let again = run_to_idle(&director, "offsite");
    let summary = director.summary(again).unwrap();
    assert_eq!(summary.status, JobStatus::Terminated);
    assert!(summary.messages.iter().any(|m| m == "No JobIds found to copy."));
    assert_eq!(h.catalog.copies().len(), 2);
    director.shutdown();
}

#[test]
fn test_migrate_by_job_name() {
    let h = TestHarness::new();
    h.seed_backup(
        SeedBackup::new(3, "nightly", "web-fd")
            .pool("Full")
            .files(&["/srv/a", "/srv/b"]),
    );
    h.seed_backup(
        SeedBackup::new(4, "weekly", "web-fd")
            .pool("Full")
            .files(&["/srv/c"]),
    );
    let config = two_tier(&h)
        .job(
            JobBuilder::new("archive-nightly", JobType::Migrate)
                .pool("Full")
                .selection(SelectionType::Job, Some("^night"))
                .build(),
        )
        .build();
    let director = h.director(config);

    run_to_idle(&director, "archive-nightly");
    assert!(h.catalog.job(JobId(3)).unwrap().migrated);
    assert!(!h.catalog.job(JobId(4)).unwrap().migrated);
    assert!(h.catalog.copies().is_empty());

    // The data mover read the source volume and wrote to the next pool's storage.
    let read = h
        .agents
        .bootstraps()
        .into_iter()
        .find(|(agent, _)| agent == "CopyFile")
        .expect("mover bootstrap");
    assert!(read.1.contains("Volume=\"Full-0003\""), "{}", read.1);

    let again = run_to_idle(&director, "archive-nightly");
    assert!(director
        .summary(again)
        .unwrap()
        .messages
        .iter()
        .any(|m| m == "No JobIds found to migrate."));
    director.shutdown();
}

#[test]
fn test_canceling_migration_cancels_mover() {
    let h = TestHarness::new();
    h.agents.script("CopyFile", AgentScript::hanging());
    h.seed_backup(
        SeedBackup::new(3, "nightly", "web-fd")
            .pool("Full")
            .files(&["/srv/a"]),
    );
    let config = two_tier(&h)
        .job(
            JobBuilder::new("archive", JobType::Migrate)
                .pool("Full")
                .selection(SelectionType::Job, Some("nightly"))
                .build(),
        )
        .build();
    let director = h.director(config);
    let control = director.run("archive").unwrap();
    finished(&director, control);

    let child = director
        .list()
        .into_iter()
        .find(|s| s.job_type == JobType::Migrate)
        .expect("migration child")
        .job_id;
    wait_for_status(&director, child, JobStatus::Running);
    let mut mover = None;
    for _ in 0..500 {
        mover = director.queue().get(child).and_then(|j| j.mover());
        if mover.is_some() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    let mover = mover.expect("data mover attached");

    assert!(director.cancel(child));
    assert_eq!(finished(&director, child).status, JobStatus::Canceled);
    assert_eq!(mover.status(), JobStatus::Canceled);
    assert!(!h.catalog.job(JobId(3)).unwrap().migrated);
    director.shutdown();
}

#[test]
fn test_consolidation_builds_virtual_full() {
    let h = TestHarness::new();
    let now = Utc::now();
    for (id, level, days) in [
        (10, JobLevel::Full, 4),
        (11, JobLevel::Incremental, 3),
        (12, JobLevel::Incremental, 2),
        (13, JobLevel::Incremental, 1),
    ] {
        h.seed_backup(
            SeedBackup::new(id, "ai", "web-fd")
                .level(level)
                .pool("Full")
                .ended_at(now - Duration::days(days))
                .files(&["/data/db"]),
        );
    }
    let config = two_tier(&h)
        .job(
            JobBuilder::backup("ai", "web-fd", "File")
                .pool("Full")
                .level(JobLevel::Incremental)
                .always_incremental(1, None)
                .build(),
        )
        .job(JobBuilder::new("consolidate", JobType::Consolidate).build())
        .build();
    let director = h.director(config);

    let control = run_to_idle(&director, "consolidate");
    let summary = director.summary(control).unwrap();
    assert_eq!(summary.status, JobStatus::Terminated);
    assert!(
        summary
            .messages
            .iter()
            .any(|m| m.starts_with("Consolidating JobIds 10,11,12 of ai")),
        "{:?}",
        summary.messages
    );

    let virtual_full = director
        .history()
        .into_iter()
        .find(|s| s.level == JobLevel::VirtualFull)
        .expect("virtual full job");
    assert_eq!(virtual_full.status, JobStatus::Terminated);
    assert_eq!(
        virtual_full.volumes,
        vec!["Full-0010".to_string(), "Full-0011".to_string(), "Full-0012".to_string()]
    );
    let entry = h.catalog.job(virtual_full.job_id).unwrap();
    assert_eq!(entry.level, JobLevel::VirtualFull);
    assert_eq!(entry.name, "ai");
    director.shutdown();
}

#[test]
fn test_nothing_to_consolidate() {
    let h = TestHarness::new();
    h.seed_backup(
        SeedBackup::new(10, "ai", "web-fd")
            .pool("Full")
            .files(&["/data/db"]),
    );
    let config = two_tier(&h)
        .job(
            JobBuilder::backup("ai", "web-fd", "File")
                .pool("Full")
                .always_incremental(1, None)
                .build(),
        )
        .job(JobBuilder::new("consolidate", JobType::Consolidate).build())
        .build();
    let director = h.director(config);

    let control = run_to_idle(&director, "consolidate");
    let summary = director.summary(control).unwrap();
    assert!(summary.messages.iter().any(|m| m == "Nothing to consolidate."));
    assert_eq!(director.history().len(), 1);
    director.shutdown();
}

//! Human-readable end-of-job report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::record::{JobId, JobLevel, JobRecord, JobType};
use crate::job::status::JobStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub name: String,
    pub job_type: JobType,
    pub level: JobLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub files: u64,
    pub bytes: u64,
    #[serde(default)]
    pub volumes: Vec<String>,
    pub errors: u32,
    pub warnings: u32,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl JobSummary {
    pub fn from_record(job: &JobRecord) -> Self {
        let state = job.lock();
        Self {
            job_id: job.id(),
            name: job.name().to_string(),
            job_type: job.job_type(),
            level: job.level(),
            client: job.client().map(str::to_string),
            status: state.status,
            scheduled_at: state.timing.scheduled_at,
            started_at: state.timing.started_at,
            ended_at: state.timing.ended_at,
            files: state.files,
            bytes: state.bytes,
            volumes: state.volumes.clone(),
            errors: state.errors,
            warnings: state.warnings,
            messages: state.messages.clone(),
        }
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    pub fn termination(&self) -> String {
        match self.status {
            JobStatus::Terminated => format!("{} OK", self.job_type),
            JobStatus::Warnings => format!("{} OK -- with warnings", self.job_type),
            JobStatus::Canceled => format!("{} Canceled", self.job_type),
            JobStatus::ErrorTerminated | JobStatus::FatalError => {
                format!("*** {} Error ***", self.job_type)
            }
            other => format!("{} {}", self.job_type, other),
        }
    }
}

fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%d-%b-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_elapsed(d: Option<chrono::Duration>) -> String {
    match d {
        Some(d) => {
            let secs = d.num_seconds().max(0);
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        None => "-".to_string(),
    }
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  JobId:                  {}", self.job_id)?;
        writeln!(f, "  Job:                    {}", self.name)?;
        if self.level == JobLevel::None {
            writeln!(f, "  Type:                   {}", self.job_type)?;
        } else {
            writeln!(f, "  Type / Level:           {} / {}", self.job_type, self.level)?;
        }
        if let Some(client) = &self.client {
            writeln!(f, "  Client:                 {}", client)?;
        }
        writeln!(
            f,
            "  Scheduled time:         {}",
            format_time(Some(self.scheduled_at))
        )?;
        writeln!(f, "  Start time:             {}", format_time(self.started_at))?;
        writeln!(f, "  End time:               {}", format_time(self.ended_at))?;
        writeln!(f, "  Elapsed time:           {}", format_elapsed(self.elapsed()))?;
        writeln!(f, "  Files:                  {}", self.files)?;
        writeln!(f, "  Bytes:                  {}", self.bytes)?;
        if self.volumes.is_empty() {
            writeln!(f, "  Volume name(s):")?;
        } else {
            writeln!(f, "  Volume name(s):         {}", self.volumes.join("|"))?;
        }
        writeln!(f, "  Errors:                 {}", self.errors)?;
        writeln!(f, "  Warnings:               {}", self.warnings)?;
        write!(f, "  Termination:            {}", self.termination())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobDefinition;
    use crate::events::JobEventBroadcaster;
    use crate::job::JobRequest;
    use std::sync::Arc;

    fn finished(status: JobStatus) -> JobSummary {
        let def = Arc::new(JobDefinition::new("nightly", JobType::Backup));
        let job = JobRecord::new(
            JobId(4),
            "nightly.2026-10-14_01.00.00_00".to_string(),
            0,
            JobRequest::from_definition(def),
            JobEventBroadcaster::default(),
        );
        job.set_status(JobStatus::Running);
        {
            let mut state = job.lock();
            state.files = 12;
            state.volumes.push("Full-0001".to_string());
        }
        job.set_status(status);
        JobSummary::from_record(&job)
    }

    #[test]
    fn test_termination_strings() {
        assert_eq!(finished(JobStatus::Terminated).termination(), "Backup OK");
        assert_eq!(
            finished(JobStatus::Warnings).termination(),
            "Backup OK -- with warnings"
        );
        assert_eq!(
            finished(JobStatus::FatalError).termination(),
            "*** Backup Error ***"
        );
        assert_eq!(finished(JobStatus::Canceled).termination(), "Backup Canceled");
    }

    #[test]
    fn test_display_lists_volumes_and_counts() {
        let text = finished(JobStatus::Terminated).to_string();
        assert!(text.contains("JobId:                  4"));
        assert!(text.contains("Type / Level:           Backup / Full"));
        assert!(text.contains("Volume name(s):         Full-0001"));
        assert!(text.contains("Files:                  12"));
        assert!(text.ends_with("Backup OK"));
    }
}

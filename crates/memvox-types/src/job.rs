//! Extraction job types.
//!
//! A job is the ephemeral unit of work created when a call-end event is
//! accepted. Jobs are not persisted beyond process lifetime, but their
//! status stays queryable on the in-memory board while the pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::event::TranscriptTurn;
use crate::memory::OwnerScope;

/// Lifecycle state of an extraction job.
///
/// Transitions: `Queued -> Running -> Succeeded | Failed`. Failed jobs
/// are not re-enqueued automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// A queued memory extraction job for one completed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub conversation_id: String,
    pub scope: OwnerScope,
    pub transcript: Vec<TranscriptTurn>,
    /// Call duration in seconds, as reported by the platform.
    pub duration_secs: u64,
    /// Call completion status string from the platform event.
    pub call_status: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Observable snapshot of a job on the status board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub conversation_id: String,
    pub status: JobStatus,
    pub attempt_count: u32,
    /// Terminal error description when `status == Failed`.
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Wire types for the coordinator and worker HTTP APIs.

use serde::{Deserialize, Serialize};

use crate::splitter::DEFAULT_SPLIT_SIZE;
use crate::types::{JobId, WorkerId};
use crate::wordcount::Counts;

fn default_split_size() -> i64 {
    DEFAULT_SPLIT_SIZE as i64
}

fn default_wait() -> bool {
    true
}

/// Body of `POST /submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub input_text: String,
    /// Signed so that a negative size reaches validation instead of failing to decode.
    #[serde(default = "default_split_size")]
    pub split_size: i64,
    /// Hold the response until the job is terminal.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Done => write!(f, "done"),
            JobState::Error => write!(f, "error"),
        }
    }
}

/// Response of `POST /submit` and `GET /status/{job_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Counts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub total_splits: usize,
    pub completed_splits: usize,
    #[serde(default)]
    pub fallback_splits: usize,
}

/// Coordinator → worker: count the words of one split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapRequest {
    pub job_id: JobId,
    pub split_id: usize,
    pub chunk: String,
}

/// Coordinator → worker: merge partial counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceRequest {
    pub job_id: JobId,
    pub partials: Vec<Counts>,
}

/// Answer to both map and reduce calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountsResponse {
    pub worker: String,
    pub counts: Counts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkerRequest {
    pub endpoint: WorkerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    Available,
    CoolingDown,
}

/// One row of `GET /workers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker: WorkerId,
    pub state: WorkerHealth,
    pub consecutive_failures: u32,
    pub cooldown_remaining_ms: u64,
}

//! In-memory job table.
//!
//! One entry per submitted job, keyed by [`JobId`]. Entries are created
//! `queued`, moved to `running` by the scheduler, and end `done` or `error`.
//! Once terminal an entry is frozen: every mutating call on it fails with
//! [`GridError::JobTerminal`].
//!
//! Status reads take the same lock as writes, so a snapshot's split counters
//! always agree with each other.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{GridError, Result};
use crate::model::{JobState, JobStatusResponse};
use crate::types::{JobId, WorkerId};
use crate::wordcount::Counts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStatus {
    Pending,
    InFlight,
    Done,
    /// Resolved by the local executor. Still carries a valid partial.
    FailedFallback,
}

impl SplitStatus {
    pub fn is_resolved(self) -> bool {
        matches!(self, SplitStatus::Done | SplitStatus::FailedFallback)
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub index: usize,
    pub text: String,
    pub status: SplitStatus,
    pub assigned_worker: Option<WorkerId>,
    pub retries: u32,
}

/// How a split's partial result was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Remote(WorkerId),
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub input_text: String,
    pub split_size: usize,
    pub state: JobState,
    pub splits: Vec<Split>,
    /// One entry per resolved split, keyed by split index.
    pub partials: BTreeMap<usize, Counts>,
    pub result: Option<Counts>,
    pub elapsed: Option<Duration>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    fn new(id: JobId, input_text: String, split_size: usize) -> Self {
        Self {
            id,
            input_text,
            split_size,
            state: JobState::Queued,
            splits: Vec::new(),
            partials: BTreeMap::new(),
            result: None,
            elapsed: None,
            message: None,
            created_at: Utc::now(),
        }
    }

    pub fn completed_splits(&self) -> usize {
        self.splits.iter().filter(|s| s.status.is_resolved()).count()
    }

    pub fn fallback_splits(&self) -> usize {
        self.splits
            .iter()
            .filter(|s| s.status == SplitStatus::FailedFallback)
            .count()
    }

    pub fn all_resolved(&self) -> bool {
        !self.splits.is_empty() && self.splits.iter().all(|s| s.status.is_resolved())
    }

    pub fn status_view(&self) -> JobStatusResponse {
        JobStatusResponse {
            job_id: self.id.clone(),
            status: self.state,
            message: self.message.clone(),
            result: if self.state == JobState::Done {
                self.result.clone()
            } else {
                None
            },
            elapsed_ms: self.elapsed.map(|d| d.as_millis() as u64),
            total_splits: self.splits.len(),
            completed_splits: self.completed_splits(),
            fallback_splits: self.fallback_splits(),
        }
    }

    fn split_mut(&mut self, index: usize) -> Result<&mut Split> {
        let id = self.id.clone();
        self.splits
            .get_mut(index)
            .ok_or_else(|| GridError::Internal(format!("job {id} has no split {index}")))
    }
}

/// Shared handle to the job table. Cloning is cheap.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `queued` entry. Identifiers are never reused.
    pub async fn insert(&self, id: JobId, input_text: String, split_size: usize) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(GridError::DuplicateJob(id));
        }
        jobs.insert(id.clone(), Job::new(id, input_text, split_size));
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| GridError::JobNotFound(id.clone()))
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatusResponse> {
        self.jobs
            .read()
            .await
            .get(id)
            .map(Job::status_view)
            .ok_or_else(|| GridError::JobNotFound(id.clone()))
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    async fn with_live_job<R>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> Result<R>,
    ) -> Result<R> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| GridError::JobNotFound(id.clone()))?;
        if job.state.is_terminal() {
            return Err(GridError::JobTerminal(id.clone()));
        }
        f(job)
    }

    /// `queued -> running`, installing the job's splits.
    pub async fn start(&self, id: &JobId, fragments: Vec<String>) -> Result<()> {
        self.with_live_job(id, |job| {
            if job.state != JobState::Queued {
                return Err(GridError::Internal(format!("job {id} was already started")));
            }
            job.splits = fragments
                .into_iter()
                .enumerate()
                .map(|(index, text)| Split {
                    index,
                    text,
                    status: SplitStatus::Pending,
                    assigned_worker: None,
                    retries: 0,
                })
                .collect();
            job.state = JobState::Running;
            Ok(())
        })
        .await
    }

    /// `pending -> in_flight` on `worker`.
    pub async fn mark_in_flight(&self, id: &JobId, index: usize, worker: &WorkerId) -> Result<()> {
        self.with_live_job(id, |job| {
            let split = job.split_mut(index)?;
            if split.status != SplitStatus::Pending {
                return Err(GridError::Internal(format!(
                    "split {index} of job {id} is {:?}, not pending",
                    split.status
                )));
            }
            split.status = SplitStatus::InFlight;
            split.assigned_worker = Some(worker.clone());
            Ok(())
        })
        .await
    }

    /// `in_flight -> pending` after a failed attempt. Returns the new retry count.
    pub async fn mark_retry(&self, id: &JobId, index: usize) -> Result<u32> {
        self.with_live_job(id, |job| {
            let split = job.split_mut(index)?;
            if split.status.is_resolved() {
                return Err(GridError::Internal(format!(
                    "split {index} of job {id} is already resolved"
                )));
            }
            split.status = SplitStatus::Pending;
            split.retries += 1;
            Ok(split.retries)
        })
        .await
    }

    /// Resolve a split with its partial result.
    ///
    /// Returns `false` and changes nothing if the split was already resolved,
    /// so a stray late answer can never overwrite or double-count a partial.
    pub async fn record_partial(
        &self,
        id: &JobId,
        index: usize,
        counts: Counts,
        resolution: Resolution,
    ) -> Result<bool> {
        self.with_live_job(id, |job| {
            let split = job.split_mut(index)?;
            if split.status.is_resolved() {
                return Ok(false);
            }
            match resolution {
                Resolution::Remote(worker) => {
                    split.status = SplitStatus::Done;
                    split.assigned_worker = Some(worker);
                }
                Resolution::Fallback => {
                    split.status = SplitStatus::FailedFallback;
                    split.assigned_worker = None;
                }
            }
            job.partials.insert(index, counts);
            Ok(true)
        })
        .await
    }

    /// Partial results in split-index order.
    pub async fn partials(&self, id: &JobId) -> Result<Vec<Counts>> {
        let job = self.get(id).await?;
        Ok(job.partials.into_values().collect())
    }

    /// `running -> done`. Every split must be resolved.
    pub async fn finish(
        &self,
        id: &JobId,
        result: Counts,
        elapsed: Duration,
        message: Option<String>,
    ) -> Result<()> {
        self.with_live_job(id, |job| {
            if !job.all_resolved() {
                return Err(GridError::Internal(format!(
                    "job {id} finished with {}/{} splits resolved",
                    job.completed_splits(),
                    job.splits.len()
                )));
            }
            job.state = JobState::Done;
            job.result = Some(result);
            job.elapsed = Some(elapsed);
            job.message = message;
            Ok(())
        })
        .await
    }

    /// Any live state `-> error`.
    pub async fn fail(&self, id: &JobId, message: String, elapsed: Duration) -> Result<()> {
        self.with_live_job(id, |job| {
            job.state = JobState::Error;
            job.result = None;
            job.elapsed = Some(elapsed);
            job.message = Some(message);
            Ok(())
        })
        .await
    }
}

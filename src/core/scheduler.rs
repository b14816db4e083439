// Job driver: map dispatch with retry, cooldown and local fallback, then a single reduce

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerPolicy;
use crate::core::executor::FallbackExecutor;
use crate::error::{GridError, Result, WorkerCallError};
use crate::model::{JobStatusResponse, MapRequest, ReduceRequest, SubmitJobRequest};
use crate::registry::WorkerRegistry;
use crate::splitter::Splitter;
use crate::store::{JobStore, Resolution};
use crate::types::{JobId, WorkerId};
use crate::wordcount::Counts;
use crate::worker_client::RemoteWorker;

/// What happened to one remote map attempt.
enum MapOutcome {
    Answered { worker: WorkerId, counts: Counts },
    Failed { worker: WorkerId, error: WorkerCallError },
    NoWorker,
    Aborted(GridError),
}

struct MapAttempt {
    index: usize,
    /// Retries already spent on this split before this attempt.
    retries: u32,
    outcome: MapOutcome,
}

/// Who produced the merged result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reducer {
    Remote(WorkerId),
    Local,
}

/// Turns submitted jobs into bounded, fault-tolerant streams of remote calls.
///
/// The admission semaphore is shared by every job this scheduler runs, so the
/// number of remote calls in flight never exceeds `policy.concurrency`, no
/// matter how many jobs are active.
pub struct Scheduler {
    registry: Arc<WorkerRegistry>,
    client: Arc<dyn RemoteWorker>,
    fallback: Arc<dyn FallbackExecutor>,
    store: JobStore,
    policy: SchedulerPolicy,
    admission: Arc<Semaphore>,
    preflight: bool,
}

impl Scheduler {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        client: Arc<dyn RemoteWorker>,
        fallback: Arc<dyn FallbackExecutor>,
        store: JobStore,
        policy: SchedulerPolicy,
    ) -> Self {
        let admission = Arc::new(Semaphore::new(policy.concurrency.max(1)));
        Self {
            registry,
            client,
            fallback,
            store,
            policy,
            admission,
            preflight: false,
        }
    }

    /// Probe workers before each job starts.
    pub fn with_preflight(mut self, enabled: bool) -> Self {
        self.preflight = enabled;
        self
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &SchedulerPolicy {
        &self.policy
    }

    /// Validate a submission and create its `queued` entry.
    ///
    /// Nothing is split or dispatched here; bad input never reaches the engine.
    pub async fn submit(&self, request: SubmitJobRequest) -> Result<JobId> {
        if request.input_text.trim().is_empty() {
            return Err(GridError::InvalidInput("input_text is empty".to_string()));
        }
        if request.split_size <= 0 {
            return Err(GridError::InvalidInput(format!(
                "split_size must be a positive integer, got {}",
                request.split_size
            )));
        }

        let id = request.job_id.unwrap_or_else(JobId::generate);
        let split_size = usize::try_from(request.split_size)
            .map_err(|_| GridError::InvalidInput("split_size is too large".to_string()))?;
        self.store
            .insert(id.clone(), request.input_text, split_size)
            .await?;
        info!(job_id = %id, split_size, "Job queued");
        Ok(id)
    }

    /// Submit and run to completion.
    pub async fn execute(&self, request: SubmitJobRequest) -> Result<JobStatusResponse> {
        let id = self.submit(request).await?;
        self.run_job(&id).await
    }

    /// Run a queued job on its own task.
    pub fn spawn_job(self: &Arc<Self>, id: JobId) -> JoinHandle<Result<JobStatusResponse>> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_job(&id).await })
    }

    /// Drive a queued job to `done` or `error` and return its final status.
    pub async fn run_job(&self, id: &JobId) -> Result<JobStatusResponse> {
        let started = Instant::now();

        match self.drive(id, started).await {
            Ok(()) => {}
            Err(GridError::JobTerminal(_)) => {}
            Err(e) => {
                error!(job_id = %id, error = %e, "Job failed");
                self.store
                    .fail(id, format!("job failed: {e}"), started.elapsed())
                    .await?;
            }
        }

        self.store.status(id).await
    }

    async fn drive(&self, id: &JobId, started: Instant) -> Result<()> {
        let job = self.store.get(id).await?;
        let fragments: Vec<String> = Splitter::new(&job.input_text, job.split_size)?
            .fragments()?
            .into_iter()
            .map(str::to_string)
            .collect();
        let total = fragments.len();

        self.store.start(id, fragments.clone()).await?;
        info!(job_id = %id, splits = total, "Job running");

        if self.preflight {
            self.registry.preflight(self.client.as_ref()).await;
        }

        self.map_phase(id, &fragments).await?;

        let partials = self.store.partials(id).await?;
        let (merged, reducer) = self.reduce_phase(id, partials).await?;

        let fallback_splits = self.store.get(id).await?.fallback_splits();
        let message = fallback_message(fallback_splits, total, &reducer);
        let elapsed = started.elapsed();
        self.store.finish(id, merged, elapsed, message).await?;

        info!(
            job_id = %id,
            splits = total,
            fallback_splits,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job done"
        );
        Ok(())
    }

    async fn map_phase(&self, id: &JobId, fragments: &[String]) -> Result<()> {
        let cursor = AtomicUsize::new(0);
        let mut attempts = FuturesUnordered::new();

        for (index, fragment) in fragments.iter().enumerate() {
            attempts.push(self.map_attempt(id, index, fragment, &cursor, None, 0));
        }

        while let Some(MapAttempt {
            index,
            retries,
            outcome,
        }) = attempts.next().await
        {
            match outcome {
                MapOutcome::Answered { worker, counts } => {
                    self.registry.report_success(&worker).await;
                    let recorded = self
                        .store
                        .record_partial(id, index, counts, Resolution::Remote(worker.clone()))
                        .await?;
                    if !recorded {
                        debug!(job_id = %id, split = index, worker = %worker, "Ignoring result for resolved split");
                    }
                }
                MapOutcome::Failed { worker, error } => {
                    self.registry.report_failure(&worker).await;
                    if retries < self.policy.max_retries {
                        warn!(
                            job_id = %id,
                            split = index,
                            worker = %worker,
                            error = %error,
                            retry = retries + 1,
                            "Map call failed, retrying"
                        );
                        self.store.mark_retry(id, index).await?;
                        attempts.push(self.map_attempt(
                            id,
                            index,
                            &fragments[index],
                            &cursor,
                            Some(worker),
                            retries + 1,
                        ));
                    } else {
                        warn!(
                            job_id = %id,
                            split = index,
                            worker = %worker,
                            error = %error,
                            "Map retries exhausted"
                        );
                        self.map_locally(id, index, &fragments[index]).await?;
                    }
                }
                MapOutcome::NoWorker => {
                    debug!(job_id = %id, split = index, "No worker available");
                    self.map_locally(id, index, &fragments[index]).await?;
                }
                MapOutcome::Aborted(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// One remote map attempt. The admission permit is held for exactly the
    /// duration of the call and released on every return path.
    async fn map_attempt(
        &self,
        id: &JobId,
        index: usize,
        fragment: &str,
        cursor: &AtomicUsize,
        avoid: Option<WorkerId>,
        retries: u32,
    ) -> MapAttempt {
        let attempt = |outcome| MapAttempt {
            index,
            retries,
            outcome,
        };

        let Ok(_permit) = self.admission.acquire().await else {
            return attempt(MapOutcome::NoWorker);
        };

        let Some(worker) = self.registry.select(cursor, avoid.as_ref()).await else {
            return attempt(MapOutcome::NoWorker);
        };

        if let Err(e) = self.store.mark_in_flight(id, index, &worker).await {
            return attempt(MapOutcome::Aborted(e));
        }

        debug!(job_id = %id, split = index, worker = %worker, retries, "Dispatching map");
        let request = MapRequest {
            job_id: id.clone(),
            split_id: index,
            chunk: fragment.to_string(),
        };

        let outcome = match timeout(self.policy.call_timeout, self.client.map(&worker, &request)).await
        {
            Ok(Ok(counts)) => MapOutcome::Answered { worker, counts },
            Ok(Err(error)) => MapOutcome::Failed { worker, error },
            Err(_) => MapOutcome::Failed {
                worker,
                error: WorkerCallError::Timeout,
            },
        };
        attempt(outcome)
    }

    async fn map_locally(&self, id: &JobId, index: usize, fragment: &str) -> Result<()> {
        let counts = self.fallback.map(fragment)?;
        self.store
            .record_partial(id, index, counts, Resolution::Fallback)
            .await?;
        info!(job_id = %id, split = index, "Split resolved by local fallback");
        Ok(())
    }

    /// Single-shot reduce over every partial: available workers in round-robin
    /// order under the same retry budget as map, then the local executor.
    async fn reduce_phase(&self, id: &JobId, partials: Vec<Counts>) -> Result<(Counts, Reducer)> {
        let cursor = AtomicUsize::new(0);
        let request = ReduceRequest {
            job_id: id.clone(),
            partials,
        };
        let mut avoid: Option<WorkerId> = None;

        for attempt in 0..=self.policy.max_retries {
            let Ok(_permit) = self.admission.acquire().await else {
                break;
            };
            let Some(worker) = self.registry.select(&cursor, avoid.as_ref()).await else {
                debug!(job_id = %id, "No worker available for reduce");
                break;
            };

            debug!(job_id = %id, worker = %worker, attempt, "Dispatching reduce");
            let error = match timeout(
                self.policy.call_timeout,
                self.client.reduce(&worker, &request),
            )
            .await
            {
                Ok(Ok(merged)) => {
                    self.registry.report_success(&worker).await;
                    return Ok((merged, Reducer::Remote(worker)));
                }
                Ok(Err(error)) => error,
                Err(_) => WorkerCallError::Timeout,
            };

            self.registry.report_failure(&worker).await;
            warn!(job_id = %id, worker = %worker, error = %error, attempt, "Reduce call failed");
            avoid = Some(worker);
        }

        let merged = self.fallback.reduce(&request.partials)?;
        info!(job_id = %id, "Reduce resolved by local fallback");
        Ok((merged, Reducer::Local))
    }
}

/// Human-readable note for a job that completed but needed local computation.
fn fallback_message(fallback_splits: usize, total: usize, reducer: &Reducer) -> Option<String> {
    let mut notes = Vec::new();
    if fallback_splits > 0 {
        notes.push(format!(
            "no worker completed {fallback_splits} of {total} splits, used local computation"
        ));
    }
    if *reducer == Reducer::Local {
        notes.push("no worker completed the reduce, used local computation".to_string());
    }
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_message() {
        assert_eq!(
            fallback_message(0, 3, &Reducer::Remote(WorkerId::new("w"))),
            None
        );
        assert_eq!(
            fallback_message(2, 3, &Reducer::Local).unwrap(),
            "no worker completed 2 of 3 splits, used local computation; \
             no worker completed the reduce, used local computation"
        );
    }
}

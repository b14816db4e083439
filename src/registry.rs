//! Worker registry: which endpoints exist and which may receive work right now.
//!
//! Health state is shared by every running job. All reads and the
//! read-modify-write of failure counts happen under one lock, so concurrent
//! jobs reporting on the same worker never lose an update.

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SchedulerPolicy;
use crate::error::{GridError, Result};
use crate::model::{WorkerHealth, WorkerStatus};
use crate::types::WorkerId;
use crate::worker_client::RemoteWorker;

/// Validate a worker endpoint: an absolute http(s) URL.
pub fn parse_endpoint(raw: &str) -> Result<WorkerId> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| GridError::InvalidInput(format!("invalid worker endpoint `{trimmed}`: {e}")))?;
    if !["http", "https"].contains(&parsed.scheme()) || parsed.host_str().is_none() {
        return Err(GridError::InvalidInput(format!(
            "worker endpoint `{trimmed}` must be an http(s) URL with a host"
        )));
    }
    Ok(WorkerId::new(trimmed.trim_end_matches('/')))
}

#[derive(Debug, Clone)]
struct WorkerEntry {
    id: WorkerId,
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
}

impl WorkerEntry {
    fn new(id: WorkerId) -> Self {
        Self {
            id,
            consecutive_failures: 0,
            cooldown_until: None,
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        self.cooldown_until.is_none_or(|until| until <= now)
    }
}

pub struct WorkerRegistry {
    /// Registration order is the preference order.
    workers: RwLock<Vec<WorkerEntry>>,
    cooldown_base: Duration,
    cooldown_cap: Duration,
}

impl WorkerRegistry {
    pub fn new(workers: impl IntoIterator<Item = WorkerId>, policy: &SchedulerPolicy) -> Self {
        let mut entries: Vec<WorkerEntry> = Vec::new();
        for id in workers {
            if !entries.iter().any(|e| e.id == id) {
                entries.push(WorkerEntry::new(id));
            }
        }
        Self {
            workers: RwLock::new(entries),
            cooldown_base: policy.cooldown_base,
            cooldown_cap: policy.cooldown_cap,
        }
    }

    /// Add a worker. Returns `false` if it was already known.
    pub async fn register(&self, id: WorkerId) -> bool {
        let mut workers = self.workers.write().await;
        if workers.iter().any(|e| e.id == id) {
            return false;
        }
        info!(worker = %id, "Worker registered");
        workers.push(WorkerEntry::new(id));
        true
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Workers not in cooldown, in registration order.
    pub async fn list_available(&self) -> Vec<WorkerId> {
        let now = Instant::now();
        self.workers
            .read()
            .await
            .iter()
            .filter(|e| e.is_available(now))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Pick the next available worker round-robin, advancing `cursor`.
    ///
    /// `avoid` is skipped when any other worker is available; when it is the
    /// only one left it is returned anyway.
    pub async fn select(&self, cursor: &AtomicUsize, avoid: Option<&WorkerId>) -> Option<WorkerId> {
        let available = self.list_available().await;
        if available.is_empty() {
            return None;
        }

        let start = cursor.fetch_add(1, Ordering::Relaxed) % available.len();
        let mut rotated = available.iter().cycle().skip(start).take(available.len());
        let first = rotated.clone().next().cloned();
        rotated.find(|w| Some(*w) != avoid).cloned().or(first)
    }

    pub async fn report_success(&self, id: &WorkerId) {
        let mut workers = self.workers.write().await;
        if let Some(entry) = workers.iter_mut().find(|e| &e.id == id) {
            if entry.consecutive_failures > 0 {
                debug!(worker = %id, "Worker recovered");
            }
            entry.consecutive_failures = 0;
            entry.cooldown_until = None;
        }
    }

    /// Record a failed call and put the worker into cooldown.
    ///
    /// Returns the cooldown that was applied.
    pub async fn report_failure(&self, id: &WorkerId) -> Duration {
        let mut workers = self.workers.write().await;
        let Some(entry) = workers.iter_mut().find(|e| &e.id == id) else {
            return Duration::ZERO;
        };

        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        let backoff = self.backoff_for(entry.consecutive_failures);
        entry.cooldown_until = Some(Instant::now() + backoff);

        warn!(
            worker = %id,
            failures = entry.consecutive_failures,
            cooldown_ms = backoff.as_millis() as u64,
            "Worker entering cooldown"
        );
        backoff
    }

    /// `base * 2^(failures - 1)`, capped.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        self.cooldown_base
            .saturating_mul(1u32 << exponent)
            .min(self.cooldown_cap)
    }

    /// Probe the workers that are currently available; the ones that do not
    /// answer start the job cooling down.
    ///
    /// A passing probe changes nothing. Workers already cooling down are not
    /// probed, so only real calls can end a cooldown early or reset a streak.
    pub async fn preflight<C>(&self, client: &C)
    where
        C: RemoteWorker + ?Sized,
    {
        let ids = self.list_available().await;

        let probes = ids.iter().map(|id| async move { (id, client.probe(id).await) });
        for (id, outcome) in join_all(probes).await {
            match outcome {
                Ok(()) => debug!(worker = %id, "Pre-flight probe answered"),
                Err(e) => {
                    warn!(worker = %id, error = %e, "Pre-flight probe failed");
                    self.report_failure(id).await;
                }
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<WorkerStatus> {
        let now = Instant::now();
        self.workers
            .read()
            .await
            .iter()
            .map(|e| {
                let remaining = e
                    .cooldown_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or(Duration::ZERO);
                WorkerStatus {
                    worker: e.id.clone(),
                    state: if e.is_available(now) {
                        WorkerHealth::Available
                    } else {
                        WorkerHealth::CoolingDown
                    },
                    consecutive_failures: e.consecutive_failures,
                    cooldown_remaining_ms: remaining.as_millis() as u64,
                }
            })
            .collect()
    }
}

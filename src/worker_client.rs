// Remote task client: map/reduce/probe calls against a worker over HTTP

use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

use crate::error::{GridError, Result, WorkerCallError};
use crate::model::{CountsResponse, MapRequest, ReduceRequest};
use crate::types::WorkerId;
use crate::wordcount::Counts;

/// The scheduler's view of "a worker somewhere": one call, one outcome.
///
/// Implementations report every way a call can go wrong as a
/// [`WorkerCallError`]; the scheduler decides what to do about it.
#[async_trait]
pub trait RemoteWorker: Send + Sync {
    async fn map(
        &self,
        worker: &WorkerId,
        request: &MapRequest,
    ) -> std::result::Result<Counts, WorkerCallError>;

    async fn reduce(
        &self,
        worker: &WorkerId,
        request: &ReduceRequest,
    ) -> std::result::Result<Counts, WorkerCallError>;

    /// Liveness check. Any successful answer means the worker is up.
    async fn probe(&self, worker: &WorkerId) -> std::result::Result<(), WorkerCallError>;
}

/// [`RemoteWorker`] backed by the worker HTTP API (`/map`, `/reduce`, `/`).
#[derive(Clone)]
pub struct HttpWorkerClient {
    client: Client,
}

impl HttpWorkerClient {
    pub fn new(call_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(call_timeout)
            .user_agent(concat!("gridmr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GridError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn post_counts<B: Serialize + ?Sized>(
        &self,
        worker: &WorkerId,
        path: &str,
        body: &B,
    ) -> std::result::Result<Counts, WorkerCallError> {
        let url = format!("{}{}", worker.base_url(), path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        let parsed: CountsResponse = read_json(resp).await?;
        debug!(worker = %worker, answered_by = %parsed.worker, "{} call succeeded", path);
        Ok(parsed.counts)
    }
}

#[async_trait]
impl RemoteWorker for HttpWorkerClient {
    async fn map(
        &self,
        worker: &WorkerId,
        request: &MapRequest,
    ) -> std::result::Result<Counts, WorkerCallError> {
        self.post_counts(worker, "/map", request).await
    }

    async fn reduce(
        &self,
        worker: &WorkerId,
        request: &ReduceRequest,
    ) -> std::result::Result<Counts, WorkerCallError> {
        self.post_counts(worker, "/reduce", request).await
    }

    async fn probe(&self, worker: &WorkerId) -> std::result::Result<(), WorkerCallError> {
        let resp = self
            .client
            .get(format!("{}/", worker.base_url()))
            .send()
            .await
            .map_err(classify)?;
        if !resp.status().is_success() {
            return Err(WorkerCallError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> std::result::Result<T, WorkerCallError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(WorkerCallError::Status(status.as_u16()));
    }
    resp.json::<T>().await.map_err(classify)
}

fn classify(err: reqwest::Error) -> WorkerCallError {
    if err.is_timeout() {
        WorkerCallError::Timeout
    } else if err.is_decode() {
        WorkerCallError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        WorkerCallError::Status(status.as_u16())
    } else {
        WorkerCallError::Connect(err.to_string())
    }
}

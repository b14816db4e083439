// HTTP routers for the coordinator (master) and for workers

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::Scheduler;
use crate::error::{GridError, Result};
use crate::model::{
    CountsResponse, JobStatusResponse, MapRequest, ReduceRequest, RegisterWorkerRequest,
    SubmitJobRequest, WorkerStatus,
};
use crate::registry::parse_endpoint;
use crate::types::JobId;
use crate::wordcount::{Counts, map_fragment, reduce_partials};

pub type CoordinatorState = Arc<Scheduler>;

pub fn create_coordinator_router(state: CoordinatorState) -> Router {
    Router::new()
        .route("/", get(coordinator_info))
        .route("/health", get(health_check))
        .route("/submit", post(submit_job))
        .route("/status/{job_id}", get(job_status))
        .route("/workers", get(list_workers))
        .route("/workers/register", post(register_worker))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn coordinator_info() -> Json<Value> {
    Json(serde_json::json!({
        "service": "GridMR Master",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> Result<Json<Value>> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn submit_job(
    State(scheduler): State<CoordinatorState>,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<Json<JobStatusResponse>> {
    let wait = payload.wait;
    let id = scheduler.submit(payload).await?;

    // The job runs on its own task so a client hanging up does not abandon it.
    let handle = scheduler.spawn_job(id.clone());
    if !wait {
        return Ok(Json(scheduler.store().status(&id).await?));
    }

    let status = handle
        .await
        .map_err(|e| GridError::Internal(format!("job task for {id} did not finish: {e}")))??;
    Ok(Json(status))
}

async fn job_status(
    State(scheduler): State<CoordinatorState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>> {
    let status = scheduler.store().status(&JobId::new(job_id)).await?;
    Ok(Json(status))
}

async fn list_workers(State(scheduler): State<CoordinatorState>) -> Json<Vec<WorkerStatus>> {
    Json(scheduler.registry().snapshot().await)
}

async fn register_worker(
    State(scheduler): State<CoordinatorState>,
    Json(payload): Json<RegisterWorkerRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let endpoint = parse_endpoint(payload.endpoint.as_str())?;
    let added = scheduler.registry().register(endpoint.clone()).await;
    let status = if added {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(serde_json::json!({
            "worker": endpoint,
            "registered": added,
        })),
    ))
}

/// Per-process worker identity, reported back on every answer.
#[derive(Clone)]
pub struct WorkerState {
    pub name: Arc<str>,
}

pub fn create_worker_router(name: impl Into<Arc<str>>) -> Router {
    let state = WorkerState { name: name.into() };
    Router::new()
        .route("/", get(worker_info))
        .route("/health", get(worker_health))
        .route("/map", post(do_map))
        .route("/reduce", post(do_reduce))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn worker_info(State(state): State<WorkerState>) -> Json<Value> {
    Json(serde_json::json!({
        "service": "GridMR Worker",
        "name": &*state.name,
    }))
}

async fn worker_health(State(state): State<WorkerState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "name": &*state.name,
    }))
}

async fn do_map(
    State(state): State<WorkerState>,
    Json(req): Json<MapRequest>,
) -> Json<CountsResponse> {
    tracing::debug!(job_id = %req.job_id, split = req.split_id, "Map request");
    Json(CountsResponse {
        worker: state.name.to_string(),
        counts: map_fragment(&req.chunk),
    })
}

async fn do_reduce(
    State(state): State<WorkerState>,
    Json(req): Json<ReduceRequest>,
) -> Result<Json<CountsResponse>> {
    tracing::debug!(job_id = %req.job_id, partials = req.partials.len(), "Reduce request");
    // Nothing to merge is an empty result here, not an error.
    let counts = if req.partials.is_empty() {
        Counts::new()
    } else {
        reduce_partials(&req.partials)?
    };
    Ok(Json(CountsResponse {
        worker: state.name.to_string(),
        counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::SchedulerPolicy;
    use crate::core::LocalExecutor;
    use crate::registry::WorkerRegistry;
    use crate::store::JobStore;
    use crate::worker_client::HttpWorkerClient;

    fn coordinator() -> Router {
        let policy = SchedulerPolicy::default();
        let scheduler = Scheduler::new(
            Arc::new(WorkerRegistry::new(Vec::new(), &policy)),
            Arc::new(HttpWorkerClient::new(policy.call_timeout).unwrap()),
            Arc::new(LocalExecutor::new()),
            JobStore::new(),
            policy,
        );
        create_coordinator_router(Arc::new(scheduler))
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_runs_job_locally_without_workers() {
        let app = coordinator();
        let resp = app
            .oneshot(post_json(
                "/submit",
                serde_json::json!({"job_id": "j1", "input_text": "hola hola mundo mundo mundo"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["status"], "done");
        assert_eq!(body["result"], serde_json::json!({"hola": 2, "mundo": 3}));
        assert_eq!(body["total_splits"], 1);
        assert_eq!(body["completed_splits"], 1);
        assert!(body["message"].as_str().unwrap().contains("local computation"));
    }

    #[tokio::test]
    async fn test_empty_input_is_a_client_error() {
        let app = coordinator();
        let resp = app
            .oneshot(post_json("/submit", serde_json::json!({"input_text": "   "})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["detail"].is_string());
    }

    #[tokio::test]
    async fn test_non_positive_split_size_is_a_client_error() {
        let app = coordinator();
        let resp = app
            .oneshot(post_json(
                "/submit",
                serde_json::json!({"input_text": "a b", "split_size": -3}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = coordinator();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/status/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_job_id_conflicts() {
        let app = coordinator();
        let body = serde_json::json!({"job_id": "same", "input_text": "x"});
        let first = app.clone().oneshot(post_json("/submit", body.clone())).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(post_json("/submit", body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_worker_validates_endpoint() {
        let app = coordinator();
        let bad = app
            .clone()
            .oneshot(post_json(
                "/workers/register",
                serde_json::json!({"endpoint": "not a url"}),
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let good = app
            .clone()
            .oneshot(post_json(
                "/workers/register",
                serde_json::json!({"endpoint": "http://127.0.0.1:9001"}),
            ))
            .await
            .unwrap();
        assert_eq!(good.status(), StatusCode::CREATED);

        let list = app
            .oneshot(Request::builder().uri("/workers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let workers = body_json(list).await;
        assert_eq!(workers[0]["worker"], "http://127.0.0.1:9001");
        assert_eq!(workers[0]["state"], "available");
    }

    #[tokio::test]
    async fn test_worker_map_and_reduce() {
        let app = create_worker_router("w-test");
        let resp = app
            .clone()
            .oneshot(post_json(
                "/map",
                serde_json::json!({"job_id": "j", "split_id": 0, "chunk": "Hola hola mundo"}),
            ))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["worker"], "w-test");
        assert_eq!(body["counts"], serde_json::json!({"hola": 2, "mundo": 1}));

        let resp = app
            .oneshot(post_json(
                "/reduce",
                serde_json::json!({"job_id": "j", "partials": [{"a": 1}, {"a": 2, "b": 1}]}),
            ))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["counts"], serde_json::json!({"a": 3, "b": 1}));
    }

    #[tokio::test]
    async fn test_worker_reduce_of_nothing_is_empty() {
        let app = create_worker_router("w-test");
        let resp = app
            .oneshot(post_json(
                "/reduce",
                serde_json::json!({"job_id": "j", "partials": []}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["worker"], "w-test");
        assert_eq!(body["counts"], serde_json::json!({}));
    }
}

//! Process wiring: build the engine from configuration and serve it.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::api::{create_coordinator_router, create_worker_router};
use crate::config::CoordinatorConfig;
use crate::core::{LocalExecutor, Scheduler};
use crate::registry::WorkerRegistry;
use crate::store::JobStore;
use crate::worker_client::HttpWorkerClient;

/// Assemble a scheduler talking to real workers over HTTP.
pub fn build_scheduler(config: &CoordinatorConfig) -> Result<Arc<Scheduler>> {
    let registry = Arc::new(WorkerRegistry::new(
        config.workers.iter().cloned(),
        &config.policy,
    ));
    let client = Arc::new(HttpWorkerClient::new(config.policy.call_timeout)?);

    let scheduler = Scheduler::new(
        registry,
        client,
        Arc::new(LocalExecutor::new()),
        JobStore::new(),
        config.policy.clone(),
    )
    .with_preflight(config.preflight);

    Ok(Arc::new(scheduler))
}

pub async fn start_coordinator(config: CoordinatorConfig, bind: &str) -> Result<()> {
    info!(
        workers = config.workers.len(),
        concurrency = config.policy.concurrency,
        max_retries = config.policy.max_retries,
        call_timeout_ms = config.policy.call_timeout.as_millis() as u64,
        preflight = config.preflight,
        "Starting coordinator"
    );
    if config.workers.is_empty() {
        tracing::warn!("No workers configured; jobs will run on the local fallback until workers register");
    }

    let scheduler = build_scheduler(&config)?;
    let router = create_coordinator_router(scheduler);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    info!("Coordinator listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub async fn start_worker(name: String, bind: &str) -> Result<()> {
    let router = create_worker_router(name.clone());
    let listener = tokio::net::TcpListener::bind(bind).await?;

    info!("Worker `{}` listening on http://{}", name, listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
    }
}

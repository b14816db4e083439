// Core modules
pub mod config;
pub mod error;
pub mod model;
pub mod types;

// Computation and splitting
pub mod splitter;
pub mod wordcount;

// Dispatch engine
pub mod core;
pub mod registry;
pub mod store;
pub mod worker_client;

// HTTP surface
pub mod api;
pub mod server;

// Re-export key types and functions
pub use config::{CoordinatorConfig, SchedulerPolicy, load_coordinator_config};
pub use self::core::{FallbackExecutor, LocalExecutor, Scheduler};
pub use error::{GridError, Result};
pub use registry::WorkerRegistry;
pub use store::JobStore;
pub use types::{JobId, WorkerId};
pub use worker_client::{HttpWorkerClient, RemoteWorker};

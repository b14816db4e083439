use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridmr::model::{JobStatusResponse, SubmitJobRequest};
use gridmr::registry::parse_endpoint;
use gridmr::{JobId, load_coordinator_config};

#[derive(Parser)]
#[command(name = "gridmr")]
#[command(about = "Distributed word count over a pool of unreliable workers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator (master) HTTP server
    Master {
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
        /// Path to gridmr.json (defaults to GRIDMR_CONFIG, then the usual locations)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Worker endpoint; repeat for several workers
        #[arg(long = "worker", env = "GRIDMR_WORKERS", value_delimiter = ',')]
        workers: Vec<String>,
        /// Ceiling on remote calls in flight
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        max_retries: Option<u32>,
        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Skip probing workers before each job
        #[arg(long, default_value_t = false)]
        no_preflight: bool,
    },
    /// Start a worker HTTP server
    Worker {
        #[arg(long, default_value = "0.0.0.0:8001")]
        bind: String,
        #[arg(long, env = "WORKER_NAME", default_value = "worker")]
        name: String,
    },
    /// Submit a job to a running coordinator
    Submit {
        #[arg(long, default_value = "http://localhost:8000")]
        master: String,
        /// Target split size in characters
        #[arg(long, default_value_t = 1024)]
        split: i64,
        #[arg(long)]
        job: Option<String>,
        /// Return as soon as the job is queued
        #[arg(long, default_value_t = false)]
        no_wait: bool,
        /// Read the input from a file instead of the command line
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        text: Option<String>,
    },
    /// Query a job's status
    Status {
        #[arg(long, default_value = "http://localhost:8000")]
        master: String,
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()?).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Master {
            bind,
            config,
            workers,
            concurrency,
            max_retries,
            timeout_ms,
            no_preflight,
        } => {
            let mut cfg = load_coordinator_config(config)?;

            for raw in workers.iter().filter(|w| !w.trim().is_empty()) {
                let endpoint = parse_endpoint(raw)?;
                if !cfg.workers.contains(&endpoint) {
                    cfg.workers.push(endpoint);
                }
            }
            if let Some(c) = concurrency {
                cfg.policy.concurrency = c;
            }
            if let Some(r) = max_retries {
                cfg.policy.max_retries = r;
            }
            if let Some(ms) = timeout_ms {
                cfg.policy.call_timeout = Duration::from_millis(ms);
            }
            if no_preflight {
                cfg.preflight = false;
            }
            cfg.policy.validate()?;

            gridmr::server::start_coordinator(cfg, &bind).await?;
        }
        Commands::Worker { bind, name } => {
            info!("Starting worker `{}` on {}", name, bind);
            gridmr::server::start_worker(name, &bind).await?;
        }
        Commands::Submit {
            master,
            split,
            job,
            no_wait,
            file,
            text,
        } => {
            let input_text = match (file, text) {
                (Some(path), _) => std::fs::read_to_string(&path)
                    .with_context(|| format!("could not read {}", path.display()))?,
                (None, Some(text)) => text,
                (None, None) => anyhow::bail!("provide the input text or --file <path>"),
            };

            let request = SubmitJobRequest {
                job_id: job.map(JobId::new),
                input_text,
                split_size: split,
                wait: !no_wait,
            };

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?;
            let resp = client
                .post(format!("{}/submit", master.trim_end_matches('/')))
                .json(&request)
                .send()
                .await?;
            print_response(resp).await?;
        }
        Commands::Status { master, job_id } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?;
            let resp = client
                .get(format!("{}/status/{}", master.trim_end_matches('/'), job_id))
                .send()
                .await?;
            print_response(resp).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` plus the crate's defaults; `RUST_LOG=gridmr=debug` shows per-split dispatch.
fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("gridmr=info".parse()?)
        .add_directive("tower_http=warn".parse()?))
}

async fn print_response(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await?;
    if !status.is_success() {
        anyhow::bail!(
            "coordinator answered {}: {}",
            status,
            body.get("detail").and_then(|d| d.as_str()).unwrap_or("no detail")
        );
    }

    // Round-trip through the typed response so unexpected shapes are caught here.
    let typed: JobStatusResponse = serde_json::from_value(body)?;
    println!("{}", serde_json::to_string_pretty(&typed)?);
    Ok(())
}

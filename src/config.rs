use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

use crate::error::{GridError, Result};
use crate::registry::parse_endpoint;
use crate::types::WorkerId;

/// Raw `gridmr.json` contents. Every field is optional; missing ones take the
/// reference defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridJsonConfig {
    #[serde(default)]
    pub workers: Vec<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
    #[serde(default)]
    pub cooldown_base_ms: Option<u64>,
    #[serde(default)]
    pub cooldown_cap_ms: Option<u64>,
    #[serde(default)]
    pub preflight: Option<bool>,
}

/// Knobs of the dispatch engine. Read once, never changed while jobs run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPolicy {
    /// Ceiling on remote calls in flight at the same time.
    pub concurrency: usize,
    /// Extra attempts a split (or the reduce) gets after its first failure.
    pub max_retries: u32,
    pub call_timeout: Duration,
    pub cooldown_base: Duration,
    pub cooldown_cap: Duration,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            concurrency: 16,
            max_retries: 2,
            call_timeout: Duration::from_secs(10),
            cooldown_base: Duration::from_secs(1),
            cooldown_cap: Duration::from_secs(30),
        }
    }
}

impl SchedulerPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(GridError::Config("concurrency must be at least 1".into()));
        }
        if self.cooldown_cap < self.cooldown_base {
            return Err(GridError::Config(
                "cooldownCapMs must not be smaller than cooldownBaseMs".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub workers: Vec<WorkerId>,
    pub policy: SchedulerPolicy,
    /// Probe every worker before a job starts and cool down the silent ones.
    pub preflight: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: Vec::new(),
            policy: SchedulerPolicy::default(),
            preflight: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_json(raw: GridJsonConfig) -> Result<Self> {
        let defaults = SchedulerPolicy::default();
        let policy = SchedulerPolicy {
            concurrency: raw.concurrency.unwrap_or(defaults.concurrency),
            max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
            call_timeout: raw
                .call_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            cooldown_base: raw
                .cooldown_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cooldown_base),
            cooldown_cap: raw
                .cooldown_cap_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cooldown_cap),
        };
        policy.validate()?;

        let workers = raw
            .workers
            .iter()
            .map(|w| expand_env_vars(w.trim()))
            .filter(|w| !w.is_empty())
            .map(|w| parse_endpoint(&w).map_err(|e| GridError::Config(e.to_string())))
            .collect::<Result<Vec<WorkerId>>>()?;

        Ok(Self {
            workers,
            policy,
            preflight: raw.preflight.unwrap_or(true),
        })
    }
}

/// Locate `gridmr.json`, if there is one.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("GRIDMR_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("gridmr").join("gridmr.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("gridmr.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

pub fn load_config_file(path: &std::path::Path) -> anyhow::Result<CoordinatorConfig> {
    let raw = fs::read_to_string(path)?;
    let cfg: GridJsonConfig = serde_json::from_str(&raw)?;
    Ok(CoordinatorConfig::from_json(cfg)?)
}

/// Load the coordinator configuration: an explicit path wins, then the usual
/// lookup locations, then built-in defaults.
pub fn load_coordinator_config(explicit: Option<PathBuf>) -> anyhow::Result<CoordinatorConfig> {
    match explicit.or_else(resolve_config_path) {
        Some(path) => {
            tracing::info!("Loading coordinator config from {}", path.display());
            load_config_file(&path)
        }
        None => {
            tracing::info!("No gridmr.json found, using default coordinator config");
            Ok(CoordinatorConfig::default())
        }
    }
}

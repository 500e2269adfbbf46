//! Pipeline configuration, constructed once at startup and passed down.
//!
//! No component reads the environment on its own; binaries call
//! [`PipelineConfig::from_env`] after `dotenvy::dotenv()` and hand the
//! relevant sections to the dispatcher, worker and notifier.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Longest long-poll wait the queue service accepts.
pub const MAX_POLL_WAIT_SECS: u64 = 20;

/// Largest receive batch the queue service accepts.
pub const MAX_POLL_BATCH_SIZE: u32 = 10;

/// AWS client settings shared by the S3 and SQS clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSettings {
    pub region: String,
    /// Custom endpoint (LocalStack, MinIO, ...). `None` targets real AWS.
    pub endpoint_url: Option<String>,
}

/// Where results are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub results_bucket: String,
    /// Optional first key segment for every result key.
    pub key_namespace: String,
}

/// Queue endpoints and polling behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Work queue carrying submission events (dispatcher input).
    pub request_queue_url: Option<String>,
    /// Queue subscribed to completion events (notifier input).
    pub result_queue_url: Option<String>,
    /// Queues subscribed to the submission topic.
    pub request_topic_queue_urls: Vec<String>,
    /// Queues subscribed to the completion topic.
    pub result_topic_queue_urls: Vec<String>,
    /// Bounded long-poll wait.
    pub poll_wait: Duration,
    pub batch_size: u32,
}

impl QueueSettings {
    pub fn request_queue_url(&self) -> Result<&str, CoreError> {
        self.request_queue_url
            .as_deref()
            .ok_or_else(|| missing("GAS_REQUEST_QUEUE_URL"))
    }

    pub fn result_queue_url(&self) -> Result<&str, CoreError> {
        self.result_queue_url
            .as_deref()
            .ok_or_else(|| missing("GAS_RESULT_QUEUE_URL"))
    }
}

/// How the annotation task is run and how jobs are claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Parent of the per-job working directories.
    pub work_root: PathBuf,
    pub annotator_program: String,
    /// Arguments placed before the input path.
    pub annotator_args: Vec<String>,
    pub task_timeout: Option<Duration>,
    /// Upper bound on concurrently running in-process workers.
    pub max_workers: usize,
    /// RUNNING lease length; `None` disables leases and the sweeper.
    pub lease: Option<Duration>,
}

/// How the dispatcher hands a staged job to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Bounded in-process worker pool.
    Pool,
    /// Detached `gas-worker` child process per job.
    Process,
}

impl FromStr for LaunchMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pool" => Ok(Self::Pool),
            "process" => Ok(Self::Process),
            other => Err(CoreError::Validation(format!(
                "Unknown launch mode '{other}'. Must be one of: pool, process"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub launch_mode: LaunchMode,
    /// Binary spawned in [`LaunchMode::Process`].
    pub worker_binary: PathBuf,
    pub sweep_interval: Duration,
    pub monitor_addr: SocketAddr,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub aws: AwsSettings,
    pub storage: StorageSettings,
    pub queues: QueueSettings,
    pub worker: WorkerSettings,
    pub dispatcher: DispatcherSettings,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default              |
    /// |-------------------------------|----------------------|
    /// | `DATABASE_URL`                | —                    |
    /// | `AWS_REGION`                  | `us-east-1`          |
    /// | `AWS_ENDPOINT_URL`            | —                    |
    /// | `GAS_RESULTS_BUCKET`          | `gas-results`        |
    /// | `GAS_KEY_NAMESPACE`           | empty                |
    /// | `GAS_REQUEST_QUEUE_URL`       | —                    |
    /// | `GAS_RESULT_QUEUE_URL`        | —                    |
    /// | `GAS_REQUEST_TOPIC_QUEUE_URLS`| empty (comma list)   |
    /// | `GAS_RESULT_TOPIC_QUEUE_URLS` | empty (comma list)   |
    /// | `GAS_POLL_WAIT_SECS`          | `20`                 |
    /// | `GAS_POLL_BATCH_SIZE`         | `10`                 |
    /// | `GAS_WORK_ROOT`               | `./jobs`             |
    /// | `GAS_ANNOTATOR_PROGRAM`       | `python`             |
    /// | `GAS_ANNOTATOR_ARGS`          | `anntools/run.py`    |
    /// | `GAS_TASK_TIMEOUT_SECS`       | — (no timeout)       |
    /// | `GAS_MAX_WORKERS`             | `4`                  |
    /// | `GAS_LEASE_SECS`              | `900` (`0` = off)    |
    /// | `GAS_LAUNCH_MODE`             | `pool`               |
    /// | `GAS_WORKER_BIN`              | `gas-worker`         |
    /// | `GAS_SWEEP_INTERVAL_SECS`     | `60`                 |
    /// | `GAS_MONITOR_ADDR`            | `0.0.0.0:8081`       |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`, which keeps tests independent of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let poll_wait_secs: u64 = parse_or(&get, "GAS_POLL_WAIT_SECS", 20)?;
        if poll_wait_secs > MAX_POLL_WAIT_SECS {
            return Err(CoreError::Validation(format!(
                "GAS_POLL_WAIT_SECS must not exceed {MAX_POLL_WAIT_SECS}"
            )));
        }

        let batch_size: u32 = parse_or(&get, "GAS_POLL_BATCH_SIZE", MAX_POLL_BATCH_SIZE)?;
        if batch_size == 0 || batch_size > MAX_POLL_BATCH_SIZE {
            return Err(CoreError::Validation(format!(
                "GAS_POLL_BATCH_SIZE must be between 1 and {MAX_POLL_BATCH_SIZE}"
            )));
        }

        let max_workers: usize = parse_or(&get, "GAS_MAX_WORKERS", 4)?;
        if max_workers == 0 {
            return Err(CoreError::Validation(
                "GAS_MAX_WORKERS must be at least 1".to_string(),
            ));
        }

        let sweep_interval_secs: u64 = parse_or(&get, "GAS_SWEEP_INTERVAL_SECS", 60)?;
        if sweep_interval_secs == 0 {
            return Err(CoreError::Validation(
                "GAS_SWEEP_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        let lease_secs: u64 = parse_or(&get, "GAS_LEASE_SECS", 900)?;
        let task_timeout_secs: Option<u64> = get("GAS_TASK_TIMEOUT_SECS")
            .map(|v| parse_value("GAS_TASK_TIMEOUT_SECS", &v))
            .transpose()?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            aws: AwsSettings {
                region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".into()),
                endpoint_url: get("AWS_ENDPOINT_URL"),
            },
            storage: StorageSettings {
                results_bucket: get("GAS_RESULTS_BUCKET").unwrap_or_else(|| "gas-results".into()),
                key_namespace: get("GAS_KEY_NAMESPACE").unwrap_or_default(),
            },
            queues: QueueSettings {
                request_queue_url: get("GAS_REQUEST_QUEUE_URL"),
                result_queue_url: get("GAS_RESULT_QUEUE_URL"),
                request_topic_queue_urls: split_list(get("GAS_REQUEST_TOPIC_QUEUE_URLS")),
                result_topic_queue_urls: split_list(get("GAS_RESULT_TOPIC_QUEUE_URLS")),
                poll_wait: Duration::from_secs(poll_wait_secs),
                batch_size,
            },
            worker: WorkerSettings {
                work_root: PathBuf::from(get("GAS_WORK_ROOT").unwrap_or_else(|| "./jobs".into())),
                annotator_program: get("GAS_ANNOTATOR_PROGRAM").unwrap_or_else(|| "python".into()),
                annotator_args: get("GAS_ANNOTATOR_ARGS")
                    .unwrap_or_else(|| "anntools/run.py".into())
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                task_timeout: task_timeout_secs.map(Duration::from_secs),
                max_workers,
                lease: (lease_secs > 0).then(|| Duration::from_secs(lease_secs)),
            },
            dispatcher: DispatcherSettings {
                launch_mode: parse_or(&get, "GAS_LAUNCH_MODE", LaunchMode::Pool)?,
                worker_binary: PathBuf::from(
                    get("GAS_WORKER_BIN").unwrap_or_else(|| "gas-worker".into()),
                ),
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                monitor_addr: parse_or(
                    &get,
                    "GAS_MONITOR_ADDR",
                    SocketAddr::from(([0, 0, 0, 0], 8081)),
                )?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn missing(name: &str) -> CoreError {
    CoreError::Validation(format!("{name} must be set"))
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{name} has an invalid value '{raw}'")))
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

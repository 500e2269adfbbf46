//! `gas-worker <input_path> <user_id> <user_name> <user_email>`
//!
//! Runs a single staged job to completion. Exit status 0 means the job was
//! completed or already claimed elsewhere; anything else is logged.

use std::process::ExitCode;

use gas_core::config::PipelineConfig;
use gas_worker::bootstrap::Services;
use gas_worker::{JobRequest, WorkerOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: gas-worker <input_path> <user_id> <user_name> <user_email>";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [input_path, user_id, user_name, user_email] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let request = match JobRequest::from_input_path(input_path, user_id, user_name, user_email) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, input_path = %input_path, "Invalid job arguments");
            return ExitCode::from(2);
        }
    };

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let services = match Services::connect(&config).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match services.worker(&config).run(&request).await {
        Ok(WorkerOutcome::Completed { job_id, duration_ms }) => {
            tracing::info!(job_id = %job_id, duration_ms, "Job completed");
            ExitCode::SUCCESS
        }
        Ok(WorkerOutcome::Skipped { job_id, .. }) => {
            tracing::info!(job_id = %job_id, "Job claimed elsewhere, nothing to do");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(job_id = %request.job_id, error = %e, "Job attempt failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gas_worker=info,gas_core=info,gas_db=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

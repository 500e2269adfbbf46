//! `gas-dispatcher`: work-queue consumer, lease sweeper and monitoring API.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use gas_cloud::WorkQueue;
use gas_core::config::{LaunchMode, PipelineConfig};
use gas_dispatcher::engine::{Dispatcher, LeaseSweeper};
use gas_dispatcher::router::build_app_router;
use gas_dispatcher::state::AppState;
use gas_worker::bootstrap::Services;
use gas_worker::{Launcher, ProcessLauncher, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown waits for in-process jobs before giving up on them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let request_queue_url = match config.queues.request_queue_url() {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // --- External services ---
    let services = match Services::connect(&config).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = gas_db::run_migrations(&services.pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        return ExitCode::FAILURE;
    }
    tracing::info!("Database migrations applied");

    let requests: Arc<dyn WorkQueue> = Arc::new(services.queue(&request_queue_url));

    // --- Launcher ---
    let pool = match config.dispatcher.launch_mode {
        LaunchMode::Pool => Some(WorkerPool::new(
            services.worker(&config),
            config.worker.max_workers,
        )),
        LaunchMode::Process => None,
    };
    let launcher: Arc<dyn Launcher> = match &pool {
        Some(pool) => Arc::new(pool.clone()),
        None => Arc::new(ProcessLauncher::new(config.dispatcher.worker_binary.clone())),
    };
    tracing::info!(
        launch_mode = ?config.dispatcher.launch_mode,
        max_workers = config.worker.max_workers,
        "Launcher ready",
    );

    let cancel = CancellationToken::new();

    // --- Dispatcher ---
    let dispatcher = Dispatcher::new(
        Arc::clone(&requests),
        Arc::clone(&services.objects),
        launcher,
        config.worker.work_root.clone(),
    )
    .with_polling(config.queues.batch_size, config.queues.poll_wait);
    let dispatcher_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { dispatcher.run(cancel).await }
    });

    // --- Lease sweeper ---
    let sweeper_handle = if config.worker.lease.is_some() {
        let sweeper = LeaseSweeper::new(
            Arc::clone(&services.store),
            Arc::clone(&requests),
            config.dispatcher.sweep_interval,
        );
        let cancel = cancel.clone();
        Some(tokio::spawn(async move { sweeper.run(cancel).await }))
    } else {
        tracing::info!("Leases disabled, lease sweeper not started");
        None
    };

    // --- Monitoring API ---
    let app = build_app_router(AppState {
        store: Arc::clone(&services.store),
        pool: Some(services.pool.clone()),
    });
    let addr = config.dispatcher.monitor_addr;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind monitoring address");
            cancel.cancel();
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "Monitoring API listening");

    let server_cancel = cancel.clone();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Monitoring server failed"),
                Err(e) => tracing::error!(error = %e, "Monitoring server task panicked"),
            }
        }
        () = shutdown_signal() => {}
    }

    // --- Shutdown ---
    cancel.cancel();
    let _ = dispatcher_handle.await;
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }
    tracing::info!("Dispatcher, sweeper and monitoring API stopped");

    if let Some(pool) = pool {
        let running = pool.active().await.len();
        tracing::info!(running, "Waiting for running jobs to finish");
        if tokio::time::timeout(DRAIN_TIMEOUT, pool.wait_idle()).await.is_err() {
            tracing::warn!(
                running = pool.active().await.len(),
                "Jobs still running at shutdown, their leases will expire",
            );
        }
    }

    tracing::info!("Graceful shutdown complete");
    ExitCode::SUCCESS
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "gas_dispatcher=info,gas_worker=info,gas_core=info,gas_db=info,tower_http=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

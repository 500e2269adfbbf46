//! `gas-notifier`: mails users when their annotation job has finished.

use std::process::ExitCode;
use std::sync::Arc;

use gas_cloud::aws::{load_sdk_config, sqs_client};
use gas_cloud::SqsQueue;
use gas_core::config::PipelineConfig;
use gas_events::delivery::{EmailConfig, EmailDelivery, Mailer, RecordingMailer};
use gas_notifier::Notifier;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let result_queue_url = match config.queues.result_queue_url() {
        Ok(url) => url.to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let mailer: Arc<dyn Mailer> = match EmailConfig::from_env() {
        Some(email_config) => match EmailDelivery::new(email_config) {
            Ok(delivery) => Arc::new(delivery),
            Err(e) => {
                tracing::error!(error = %e, "Invalid SMTP configuration");
                return ExitCode::FAILURE;
            }
        },
        None => {
            tracing::warn!("SMTP_HOST not set, completion emails are only logged");
            Arc::new(RecordingMailer::new())
        }
    };

    let sdk = load_sdk_config(&config.aws).await;
    let queue = SqsQueue::new(sqs_client(&sdk), result_queue_url);
    let notifier = Notifier::new(Arc::new(queue), mailer)
        .with_polling(config.queues.batch_size, config.queues.poll_wait);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { notifier.run(cancel).await }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
    }
    cancel.cancel();
    let _ = handle.await;

    tracing::info!("Graceful shutdown complete");
    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gas_notifier=info,gas_events=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

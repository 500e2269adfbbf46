//! Production wiring shared by the worker and dispatcher binaries.

use std::sync::Arc;

use aws_config::SdkConfig;
use gas_cloud::aws::{load_sdk_config, s3_client, sqs_client};
use gas_cloud::{ObjectStore, S3ObjectStore, SqsQueue, WorkQueue};
use gas_core::annotation::CommandTask;
use gas_core::config::PipelineConfig;
use gas_core::error::CoreError;
use gas_db::{DbPool, JobStore, PgJobStore, StoreError};
use gas_events::{NotificationChannel, QueueFanoutTopic};

use crate::worker::Worker;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("Job store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Clients for every external service, created once at startup.
#[derive(Clone)]
pub struct Services {
    pub pool: DbPool,
    pub sdk: SdkConfig,
    pub store: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub results_topic: Arc<dyn NotificationChannel>,
}

impl Services {
    pub async fn connect(config: &PipelineConfig) -> Result<Self, BootstrapError> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| CoreError::Validation("DATABASE_URL must be set".into()))?;
        let pool = gas_db::create_pool(database_url)
            .await
            .map_err(StoreError::from)?;

        let sdk = load_sdk_config(&config.aws).await;
        let objects = Arc::new(S3ObjectStore::new(s3_client(&sdk, &config.aws)));

        let sqs = sqs_client(&sdk);
        let subscribers: Vec<Arc<dyn WorkQueue>> = config
            .queues
            .result_topic_queue_urls
            .iter()
            .map(|url| Arc::new(SqsQueue::new(sqs.clone(), url.clone())) as Arc<dyn WorkQueue>)
            .collect();
        if subscribers.is_empty() {
            tracing::warn!("GAS_RESULT_TOPIC_QUEUE_URLS is empty, completion events reach no one");
        }

        Ok(Self {
            store: Arc::new(PgJobStore::new(pool.clone())),
            pool,
            objects,
            results_topic: Arc::new(QueueFanoutTopic::new("job-results", subscribers)),
            sdk,
        })
    }

    /// SQS queue at `url`.
    pub fn queue(&self, url: &str) -> SqsQueue {
        SqsQueue::new(sqs_client(&self.sdk), url)
    }

    /// A worker running the configured annotator command.
    pub fn worker(&self, config: &PipelineConfig) -> Worker {
        let task = CommandTask::new(
            config.worker.annotator_program.clone(),
            config.worker.annotator_args.clone(),
            config.worker.task_timeout,
        );
        Worker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.objects),
            Arc::clone(&self.results_topic),
            Arc::new(task),
            &config.storage,
        )
        .with_lease(config.worker.lease)
    }
}

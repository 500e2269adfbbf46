//! Shared AWS SDK bootstrap.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use gas_core::config::AwsSettings;

/// Load SDK configuration for `settings`.
///
/// Credentials come from the default provider chain. A custom endpoint
/// (LocalStack, MinIO) applies to every client built from the result.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut builder =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

    if let Some(endpoint) = &settings.endpoint_url {
        builder = builder.endpoint_url(endpoint);
    }

    let config = builder.load().await;
    tracing::debug!(
        region = %settings.region,
        endpoint = settings.endpoint_url.as_deref().unwrap_or("default"),
        "AWS SDK configuration loaded",
    );
    config
}

/// S3 client. Path-style addressing is forced when a custom endpoint is
/// set, since S3-compatible stores rarely serve virtual-hosted buckets.
pub fn s3_client(sdk: &SdkConfig, settings: &AwsSettings) -> aws_sdk_s3::Client {
    let config = aws_sdk_s3::config::Builder::from(sdk)
        .force_path_style(settings.endpoint_url.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

pub fn sqs_client(sdk: &SdkConfig) -> aws_sdk_sqs::Client {
    aws_sdk_sqs::Client::new(sdk)
}

//! Amazon S3 object store.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;

use super::{ObjectStore, StorageError};

const NO_SUCH_KEY: &str = "NoSuchKey";

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn download_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<u64, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.code() == Some(NO_SUCH_KEY) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Backend(format!(
                        "GetObject s3://{bucket}/{key} failed: {}",
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        let mut body = output.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = body.try_next().await.map_err(|e| {
            StorageError::Backend(format!("Reading s3://{bucket}/{key} failed: {e}"))
        })? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(bucket, key, bytes = written, "Downloaded object");
        Ok(written)
    }

    async fn upload_file(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StorageError> {
        let body = ByteStream::from_path(src).await.map_err(|e| {
            StorageError::Backend(format!("Opening {} for upload failed: {e}", src.display()))
        })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "PutObject s3://{bucket}/{key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(bucket, key, "Uploaded object");
        Ok(())
    }
}

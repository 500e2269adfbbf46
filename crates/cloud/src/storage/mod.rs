//! Object storage for job inputs and result artifacts.

pub mod memory;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use gas_core::error::{Classify, ErrorClass};

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("Object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    /// Reading or writing the local file failed.
    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage service rejected or failed the request.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl Classify for StorageError {
    fn class(&self) -> ErrorClass {
        match self {
            StorageError::NotFound { .. } => ErrorClass::Fatal,
            StorageError::Io(_) => ErrorClass::LocalIo,
            StorageError::Backend(_) => ErrorClass::Transient,
        }
    }
}

/// Bucket/key addressed blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `bucket/key` into `dest`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn download_to_file(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
    ) -> Result<u64, StorageError>;

    /// Upload the file at `src` to `bucket/key`, replacing any existing
    /// object. Re-uploading the same file is harmless.
    async fn upload_file(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StorageError>;
}

//! Cloud service adapters for the annotation pipeline.
//!
//! Two seams, each with an AWS implementation and an in-process one that
//! tests and single-node runs use:
//!
//! - [`ObjectStore`]: input and result files (S3 / [`MemoryObjectStore`]).
//! - [`WorkQueue`]: at-least-once message queues (SQS / [`MemoryQueue`]).

pub mod aws;
pub mod queue;
pub mod storage;

pub use queue::{MemoryQueue, QueueError, ReceivedMessage, SqsQueue, WorkQueue};
pub use storage::{MemoryObjectStore, ObjectStore, S3ObjectStore, StorageError};

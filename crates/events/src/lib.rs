//! Event transport for the annotation pipeline.
//!
//! - [`envelope`]: the pub/sub envelope that wraps events on subscriber
//!   queues, and decoding of queue bodies that may or may not carry one.
//! - [`topic`]: the [`NotificationChannel`] seam and its implementations.
//! - [`delivery`]: outbound user notifications (SMTP email).

pub mod delivery;
pub mod envelope;
pub mod topic;

pub use envelope::{decode_event, DecodeError, Envelope};
pub use topic::{
    publish_event, MemoryTopic, NotificationChannel, PublishError, PublishedMessage,
    QueueFanoutTopic,
};

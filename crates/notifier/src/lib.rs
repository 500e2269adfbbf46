//! Completion notifications for the annotation pipeline.
//!
//! [`handler`] turns a batch of completion events into emails, one message
//! at a time; [`consumer::Notifier`] feeds it from the result queue.

pub mod consumer;
pub mod handler;

pub use consumer::Notifier;
pub use handler::{
    completion_email, notify_batch, BatchItemFailure, BatchItemFailures, BatchReport, FailedItem,
    NotifyError, COMPLETION_EMAIL_SUBJECT,
};

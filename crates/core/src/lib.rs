//! Shared domain model for the annotation job pipeline.
//!
//! Everything in this crate is free of network and database access so that
//! the dispatcher, worker and notifier can share one definition of a job,
//! its lifecycle and its artifacts.

pub mod annotation;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod types;

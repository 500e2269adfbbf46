//! Long-running loops of the dispatcher process.

pub mod dispatcher;
pub mod sweeper;

pub use dispatcher::{Dispatcher, PollSummary};
pub use sweeper::{LeaseSweeper, SweepSummary, MAX_ATTEMPTS};

//! Scheduler layer for the agent
//!
//! This layer waits for a job to become available and hands it to the
//! runner. It owns the overall wait deadline and the retry pacing.

pub mod waiter;

pub use waiter::{FetchRetryWaiter, WaitError, Waiter};

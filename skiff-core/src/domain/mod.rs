//! Core domain types
//!
//! These types describe a job as the agent sees it: the payload it was handed,
//! the streams it must relay and the lifecycle states it reports.

pub mod job;
pub mod job_v1;
pub mod state;
pub mod stream;

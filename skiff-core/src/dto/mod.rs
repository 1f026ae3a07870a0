//! Data Transfer Objects
//!
//! Wire shapes exchanged between the agent and the job board, the status
//! endpoint and the log-parts endpoint.

pub mod job;
pub mod log;
pub mod state;

//! Skiff Core
//!
//! Core types for the Skiff job agent.
//!
//! This crate contains:
//! - Domain types: the versioned job record, stream descriptors, lifecycle states
//! - DTOs: wire shapes exchanged with the job board, status and log endpoints

pub mod domain;
pub mod dto;
pub mod error;

pub use domain::job::{JobPayload, JobRecord};
pub use domain::state::{State, StateUpdate};
pub use domain::stream::{STDOUTERR, StreamSpec};
pub use error::{DecodeError, ScriptError};

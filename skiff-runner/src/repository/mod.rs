//! Job sources
//!
//! A job source hands the agent its next job. Sources are chosen by URL
//! scheme: local payload files (or stdin) and the remote job board. All
//! sources are trait-based so the waiter can be tested with fakes.

mod jobs;
mod local;
mod remote;

// Re-export traits
pub use jobs::{JobSource, SourceError};

// Re-export implementations
pub use jobs::source_for_url;
pub use local::LocalSource;
pub use remote::RemoteSource;

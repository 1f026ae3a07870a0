//! Service layer
//!
//! Services contain the agent's business logic: running a job script,
//! relaying its output, and reporting its lifecycle.
//!
//! All services are trait-based to enable testing and dependency injection.

mod execution;
pub mod sinks;
mod statuser;
pub mod streamer;

// Re-export traits
pub use execution::Runner;
pub use sinks::{SinkProvider, StreamSink};
pub use statuser::Statuser;
pub use streamer::Streamer;

// Re-export implementations
pub use execution::{RunError, ScriptRunner};
pub use sinks::DestinationSinks;
pub use statuser::UrlStatuser;
pub use streamer::CopyStreamer;

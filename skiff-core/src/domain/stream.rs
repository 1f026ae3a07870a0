//! Stream descriptors

use serde::{Deserialize, Serialize};

/// Name of the stream carrying the script's combined stdout and stderr
pub const STDOUTERR: &str = "stdouterr";

/// Destination meaning "the agent's own standard output"
pub const STDOUT_DESTINATION: &str = "-";

/// A named output stream declared by a job
///
/// The descriptor is immutable. The runner binds it to a live source and sink
/// right before the script is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub name: String,
    pub destination: String,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
        }
    }

    /// The default combined-output stream, relayed to stdout
    pub fn stdouterr() -> Self {
        Self::new(STDOUTERR, STDOUT_DESTINATION)
    }

    pub fn is_stdout(&self) -> bool {
        self.destination.is_empty() || self.destination == STDOUT_DESTINATION
    }
}

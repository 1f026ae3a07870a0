//! Job board DTOs

use serde::{Deserialize, Serialize};

/// Response to `POST /jobs/pop` when a job was claimed
///
/// The id is a decimal `u64` rendered as a string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopResponse {
    #[serde(default)]
    pub job_id: String,
}

impl PopResponse {
    /// Parses the claimed job id
    pub fn parse_job_id(&self) -> Result<u64, std::num::ParseIntError> {
        self.job_id.trim().parse::<u64>()
    }
}

//! Log part DTOs

use serde::{Deserialize, Serialize};

/// One chunk of streamed job output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPart {
    pub id: String,
    pub log: String,
    pub number: u64,
    #[serde(rename = "final")]
    pub is_final: bool,
}

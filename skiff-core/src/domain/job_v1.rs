//! Version 1 of the job payload schema
//!
//! Every field is optional on the wire. Missing objects decode to `None` and
//! missing scalars to their defaults, so a minimal local payload such as
//! `{"version": 1, "job_script": {...}}` is accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Top-level v1 payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1 {
    pub data: Option<JobV1Data>,
    pub job_script: Option<JobV1Script>,
    pub job_state_url: String,
    pub log_parts_url: String,
    pub jwt: String,
    pub image_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1Data {
    #[serde(rename = "type")]
    pub kind: String,
    pub job: Option<JobV1DataJob>,
    #[serde(rename = "source")]
    pub build: Option<JobV1DataBuild>,
    pub repository: Option<JobV1DataRepository>,
    pub uuid: String,
    pub config: BTreeMap<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<JobV1DataTimeouts>,
    pub vm_type: String,
    pub vm_config: Option<JobV1DataVmConfig>,
    pub meta: Option<JobV1DataMeta>,
    pub queue: String,
    pub trace: bool,
    pub warmer: bool,
    /// Stream name to destination (`-` for stdout, otherwise a path or `file://` URL)
    pub streams: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1DataJob {
    pub id: u64,
    pub number: String,
    pub queued_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1Script {
    pub name: String,
    pub encoding: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1DataBuild {
    pub id: u64,
    pub number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1DataRepository {
    pub id: u64,
    pub slug: String,
}

/// Time limits in seconds; zero means unlimited
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1DataTimeouts {
    pub hard_limit: u64,
    pub log_silence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1DataMeta {
    pub state_update_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobV1DataVmConfig {
    pub gpu_count: u64,
    pub gpu_type: String,
    pub zone: String,
}

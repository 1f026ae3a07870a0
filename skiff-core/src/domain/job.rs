//! Job record
//!
//! A job arrives as a versioned JSON payload. Decoding happens in two phases:
//! the `version` discriminator is peeked first, then the whole document is
//! decoded against the schema for that version. New schema versions become new
//! [`JobPayload`] variants without touching the existing ones.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use serde::de::Error as _;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::domain::job_v1::JobV1;
use crate::domain::stream::{STDOUTERR, StreamSpec};
use crate::error::{DecodeError, ScriptError};

/// The only script encoding the agent understands
pub const SCRIPT_ENCODING_BASE64: &str = "base64";

/// Decoded payload, one variant per schema version
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    V1(JobV1),
}

impl JobPayload {
    pub fn version(&self) -> u32 {
        match self {
            JobPayload::V1(_) => 1,
        }
    }
}

/// A fetched job, read-only once decoded
///
/// The record is created by a job source and owned by the runner for the
/// duration of one run.
#[derive(Clone)]
pub struct JobRecord {
    id: String,
    payload: JobPayload,
    streams: BTreeMap<String, StreamSpec>,
}

impl JobRecord {
    /// Decodes a raw payload
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: JsonValue = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decodes an already parsed JSON document
    pub fn from_value(value: JsonValue) -> Result<Self, DecodeError> {
        if !value.is_object() {
            return Err(DecodeError::Malformed(serde_json::Error::custom(
                "job payload is not a JSON object",
            )));
        }

        // Peek the discriminator before committing to a schema
        let version = match value.get("version") {
            None | Some(JsonValue::Null) => return Err(DecodeError::MissingVersion),
            Some(version) => version.clone(),
        };

        let payload = match version_label(&version).as_deref() {
            Some("1") => JobPayload::V1(serde_json::from_value(value)?),
            Some(other) => return Err(DecodeError::UnsupportedVersion(other.to_string())),
            None => return Err(DecodeError::UnsupportedVersion(version.to_string())),
        };

        Ok(Self::from_payload(payload))
    }

    /// Wraps a payload, deriving the id and the stream map
    pub fn from_payload(payload: JobPayload) -> Self {
        let (id, mut streams) = match &payload {
            JobPayload::V1(job) => {
                let data = job.data.as_ref();
                let id = data
                    .and_then(|d| d.job.as_ref())
                    .map(|j| j.id.to_string())
                    .unwrap_or_default();
                let streams: BTreeMap<String, StreamSpec> = data
                    .map(|d| {
                        d.streams
                            .iter()
                            .map(|(name, dest)| (name.clone(), StreamSpec::new(name, dest)))
                            .collect()
                    })
                    .unwrap_or_default();
                (id, streams)
            }
        };

        streams
            .entry(STDOUTERR.to_string())
            .or_insert_with(StreamSpec::stdouterr);

        Self {
            id,
            payload,
            streams,
        }
    }

    /// Encodes the record back into its versioned wire form
    pub fn to_value(&self) -> Result<JsonValue, DecodeError> {
        let mut value = match &self.payload {
            JobPayload::V1(job) => serde_json::to_value(job)?,
        };
        if let JsonValue::Object(map) = &mut value {
            map.insert("version".to_string(), JsonValue::from(self.version()));
        }
        Ok(value)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(&self.to_value()?)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.payload.version()
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Bearer credential for status reports. Never log this.
    pub fn jwt(&self) -> &str {
        match &self.payload {
            JobPayload::V1(job) => &job.jwt,
        }
    }

    /// URL template for status reports, with a `{job_id}` placeholder
    pub fn job_state_url(&self) -> &str {
        match &self.payload {
            JobPayload::V1(job) => &job.job_state_url,
        }
    }

    pub fn log_parts_url(&self) -> &str {
        match &self.payload {
            JobPayload::V1(job) => &job.log_parts_url,
        }
    }

    pub fn image_name(&self) -> &str {
        match &self.payload {
            JobPayload::V1(job) => &job.image_name,
        }
    }

    /// Decodes the job script
    ///
    /// A job without a script, or with empty content, yields an empty script.
    pub fn script(&self) -> Result<String, ScriptError> {
        let script = match &self.payload {
            JobPayload::V1(job) => match &job.job_script {
                Some(script) => script,
                None => return Ok(String::new()),
            },
        };

        if script.content.is_empty() {
            return Ok(String::new());
        }

        if script.encoding != SCRIPT_ENCODING_BASE64 {
            return Err(ScriptError::UnsupportedEncoding(script.encoding.clone()));
        }

        let decoded = BASE64_STANDARD.decode(script.content.trim())?;
        Ok(String::from_utf8(decoded)?)
    }

    /// All declared streams; always contains [`STDOUTERR`]
    pub fn streams(&self) -> &BTreeMap<String, StreamSpec> {
        &self.streams
    }

    pub fn stream(&self, name: &str) -> Option<&StreamSpec> {
        self.streams.get(name)
    }

    /// Hard execution limit declared by the payload, if any
    pub fn hard_limit(&self) -> Option<Duration> {
        match &self.payload {
            JobPayload::V1(job) => job
                .data
                .as_ref()
                .and_then(|d| d.timeouts.as_ref())
                .map(|t| t.hard_limit)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    /// Number of state updates the dispatcher had seen when the job was handed out
    pub fn state_update_count(&self) -> u32 {
        match &self.payload {
            JobPayload::V1(job) => job
                .data
                .as_ref()
                .and_then(|d| d.meta.as_ref())
                .map(|m| m.state_update_count)
                .unwrap_or(0),
        }
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("job_state_url", &self.job_state_url())
            .field("log_parts_url", &self.log_parts_url())
            .field("jwt", &"<redacted>")
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn version_label(version: &JsonValue) -> Option<String> {
    match version {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

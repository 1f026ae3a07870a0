//! Job lifecycle states and transition reports

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a job
///
/// Typical forward progression is
/// `created → queued → received → started → {passed | failed | errored | canceled | restarted}`,
/// with `finished` as a terminal umbrella.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Created,
    Queued,
    Received,
    Started,
    Passed,
    Failed,
    Errored,
    Canceled,
    Restarted,
    Finished,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Created => "created",
            State::Queued => "queued",
            State::Received => "received",
            State::Started => "started",
            State::Passed => "passed",
            State::Failed => "failed",
            State::Errored => "errored",
            State::Canceled => "canceled",
            State::Restarted => "restarted",
            State::Finished => "finished",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meta key carrying the running count of state updates for a job
pub const STATE_UPDATE_COUNT: &str = "state_update_count";

/// A reported move from one state to another
///
/// This is a report, not a guard: no transition table is enforced here.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub job_id: String,
    pub cur: State,
    pub new: State,
    pub meta: BTreeMap<String, JsonValue>,
}

impl StateUpdate {
    pub fn new(job_id: impl Into<String>, cur: State, new: State) -> Self {
        Self {
            job_id: job_id.into(),
            cur,
            new,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

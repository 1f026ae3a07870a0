//! State update DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::domain::state::{State, StateUpdate};

/// Body of a `PATCH` to the job state URL
///
/// `state` always repeats `new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdateBody {
    pub id: String,
    pub state: State,
    pub cur: State,
    pub new: State,
    pub meta: BTreeMap<String, JsonValue>,
}

impl From<&StateUpdate> for StateUpdateBody {
    fn from(update: &StateUpdate) -> Self {
        Self {
            id: update.job_id.clone(),
            state: update.new,
            cur: update.cur,
            new: update.new,
            meta: update.meta.clone(),
        }
    }
}

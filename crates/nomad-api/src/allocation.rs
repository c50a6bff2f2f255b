//! Allocation records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Client status values of an allocation.
pub mod client_status {
    pub const PENDING: &str = "pending";
    pub const RUNNING: &str = "running";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
    pub const LOST: &str = "lost";
}

/// A task group instance placed on a client node.
///
/// The same shape decodes both the full allocation and the list stubs
/// returned by `/v1/evaluation/{id}/allocations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "TaskGroup", default)]
    pub task_group: String,
    #[serde(rename = "ClientStatus", default)]
    pub client_status: String,
    #[serde(rename = "ClientDescription", default, skip_serializing_if = "Option::is_none")]
    pub client_description: Option<String>,
    /// Per-task states, keyed by task name. Null until the client reports.
    #[serde(rename = "TaskStates", default, deserialize_with = "null_as_empty")]
    pub task_states: BTreeMap<String, TaskState>,
}

/// State of a single task inside an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Failed", default)]
    pub failed: bool,
    #[serde(rename = "Restarts", default)]
    pub restarts: u64,
}

impl Allocation {
    /// Task names in a stable order.
    pub fn task_names(&self) -> Vec<String> {
        self.task_states.keys().cloned().collect()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, TaskState>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let states: Option<BTreeMap<String, TaskState>> = Option::deserialize(deserializer)?;
    Ok(states.unwrap_or_default())
}

//! Evaluation records.

use serde::{Deserialize, Serialize};

/// Evaluation status values reported by the scheduler.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const BLOCKED: &str = "blocked";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
    pub const CANCELED: &str = "canceled";
}

/// Scheduling decision triggered by a job registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "StatusDescription", default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(rename = "JobID", default)]
    pub job_id: String,
}

impl Evaluation {
    pub fn is_complete(&self) -> bool {
        self.status == status::COMPLETE
    }

    /// Statuses from which the evaluation will never reach `complete`.
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), status::FAILED | status::CANCELED)
    }
}

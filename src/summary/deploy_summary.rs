//! Machine-readable deploy summary

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deploy::{DeployRequest, DeployState, Outcome, Transition};

/// Schema identifier for the deploy summary
pub const SUMMARY_SCHEMA_ID: &str = "nomad-deploy/summary@1";

/// Everything known about a finished deploy
#[derive(Debug, Clone, Serialize)]
pub struct DeploySummary {
    pub schema_id: String,

    pub job: String,
    pub image: String,
    pub tag: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_status: Option<String>,

    /// Control-plane UI, for operators following along
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_url: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Wall-clock deploy duration in milliseconds
    pub duration_ms: u64,

    /// Stable exit code
    pub exit_code: i32,

    pub outcome: Outcome,

    /// Recorded state transitions, empty when the tunnel never opened
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,
}

impl DeploySummary {
    pub fn new(request: &DeployRequest, outcome: Outcome, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        Self {
            schema_id: SUMMARY_SCHEMA_ID.to_string(),
            job: request.job_name.clone(),
            image: request.image.clone(),
            tag: request.tag.clone(),
            wait_status: request.wait_status.clone().filter(|s| !s.is_empty()),
            ui_url: None,
            started_at,
            finished_at,
            duration_ms,
            exit_code: outcome.exit_code(),
            outcome,
            transitions: Vec::new(),
        }
    }

    pub fn with_ui_url(mut self, ui_url: Option<String>) -> Self {
        self.ui_url = ui_url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_transitions(mut self, transitions: Vec<Transition>) -> Self {
        self.transitions = transitions;
        self
    }

    /// Last state reached
    pub fn final_state(&self) -> DeployState {
        self.transitions.last().map(|t| t.to).unwrap_or(DeployState::Idle)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

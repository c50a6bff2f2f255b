//! Deploy outcome and failure taxonomy
//!
//! Every deploy ends in a single [`Outcome`]. Failures carry a
//! [`FailureKind`] with a stable process exit code and, for failed
//! allocations, per-task logs.

use std::collections::BTreeMap;

use serde::Serialize;

use nomad_api::SubmitJobResponse;

use crate::nomad::ClientError;
use crate::signal::EXIT_CODE_CANCELLED;
use crate::tunnel::TunnelError;

use super::state::DeployStateError;

/// Message used when no allocation matched
pub const NOTHING_WAS_RUN: &str = "nothing was run";

/// Failure kind - categorizes the cause of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// SSH connection or authentication failure
    TunnelUnavailable,
    /// Job neither registered nor recoverable from its job file
    JobNotFound,
    /// Control-plane request failed or returned garbage
    ControlPlane,
    /// No allocation matched after filtering
    NothingRun,
    /// An allocation reached the failed client status
    AllocationFailed,
    /// The evaluation settled in a failed status
    EvaluationFailed,
    /// A wait exceeded its configured limit
    TimedOut,
    /// Configuration or request parameters were rejected
    InvalidConfig,
    /// Interrupted by the caller
    Cancelled,
}

impl FailureKind {
    /// Get the stable exit code for this failure kind
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureKind::TunnelUnavailable => 20,
            FailureKind::JobNotFound => 30,
            FailureKind::ControlPlane => 31,
            FailureKind::NothingRun => 40,
            FailureKind::AllocationFailed => 41,
            FailureKind::EvaluationFailed => 42,
            FailureKind::TimedOut => 50,
            FailureKind::InvalidConfig => 60,
            FailureKind::Cancelled => EXIT_CODE_CANCELLED,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::TunnelUnavailable => "Tunnel unavailable",
            FailureKind::JobNotFound => "Job not found",
            FailureKind::ControlPlane => "Control plane request failed",
            FailureKind::NothingRun => "Nothing was run",
            FailureKind::AllocationFailed => "Allocation failed",
            FailureKind::EvaluationFailed => "Evaluation failed",
            FailureKind::TimedOut => "Timed out",
            FailureKind::InvalidConfig => "Invalid configuration",
            FailureKind::Cancelled => "Deploy cancelled",
        }
    }
}

/// Captured output of one task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskLogs {
    pub stdout: String,
    pub stderr: String,
}

/// Data attached to a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Diagnostics {
    None,
    /// Logs keyed by task name
    Tasks(BTreeMap<String, TaskLogs>),
    /// Whatever was received when no allocation could be decoded
    Opaque(String),
}

/// A failed deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<String>,
    pub diagnostics: Diagnostics,
}

impl DeployFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            allocation_id: None,
            diagnostics: Diagnostics::None,
        }
    }

    pub fn nothing_run() -> Self {
        Self::new(FailureKind::NothingRun, NOTHING_WAS_RUN)
    }

    pub fn tunnel(err: TunnelError) -> Self {
        Self::new(FailureKind::TunnelUnavailable, err.to_string())
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "deploy cancelled")
    }

    pub fn with_allocation(mut self, allocation_id: impl Into<String>) -> Self {
        self.allocation_id = Some(allocation_id.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Task logs, if the failure carries them
    pub fn task_logs(&self) -> Option<&BTreeMap<String, TaskLogs>> {
        match &self.diagnostics {
            Diagnostics::Tasks(tasks) => Some(tasks),
            _ => None,
        }
    }
}

impl From<ClientError> for DeployFailure {
    fn from(err: ClientError) -> Self {
        DeployFailure::new(FailureKind::ControlPlane, err.to_string())
    }
}

impl From<DeployStateError> for DeployFailure {
    fn from(err: DeployStateError) -> Self {
        DeployFailure::new(FailureKind::ControlPlane, err.to_string())
    }
}

/// What a successful deploy produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeploySuccess {
    /// Submitted without waiting
    Submitted { response: SubmitJobResponse },
    /// Every watched allocation reached the target status
    Settled {
        evaluation_id: String,
        allocations: Vec<String>,
    },
}

/// Final result of a deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok(DeploySuccess),
    Error(DeployFailure),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn failure(&self) -> Option<&DeployFailure> {
        match self {
            Outcome::Error(failure) => Some(failure),
            Outcome::Ok(_) => None,
        }
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Ok(_) => 0,
            Outcome::Error(failure) => failure.kind.exit_code(),
        }
    }
}

impl From<Result<DeploySuccess, DeployFailure>> for Outcome {
    fn from(result: Result<DeploySuccess, DeployFailure>) -> Self {
        match result {
            Ok(success) => Outcome::Ok(success),
            Err(failure) => Outcome::Error(failure),
        }
    }
}

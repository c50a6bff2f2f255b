//! Request and response bodies for job registration, parsing and logs.

use serde::{Deserialize, Serialize};

use crate::job::JobSpec;

/// Body of `POST /v1/job/{name}`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobRequest {
    #[serde(rename = "Job")]
    pub job: JobSpec,
    /// Reject the registration if the job changed since it was read.
    #[serde(rename = "EnforceIndex")]
    pub enforce_index: bool,
    #[serde(rename = "JobModifyIndex", skip_serializing_if = "Option::is_none")]
    pub job_modify_index: Option<u64>,
}

impl SubmitJobRequest {
    /// Build a registration that enforces the job's own modify index when it
    /// has one.
    pub fn for_job(job: JobSpec) -> Self {
        let job_modify_index = job.modify_index();
        Self {
            job,
            enforce_index: job_modify_index.is_some(),
            job_modify_index,
        }
    }
}

/// Response of a job registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    #[serde(rename = "EvalID", default)]
    pub eval_id: String,
    #[serde(rename = "EvalCreateIndex", default)]
    pub eval_create_index: u64,
    #[serde(rename = "JobModifyIndex", default)]
    pub job_modify_index: u64,
    #[serde(rename = "Warnings", default)]
    pub warnings: String,
}

/// Body of `POST /v1/jobs/parse`.
#[derive(Debug, Clone, Serialize)]
pub struct ParseJobRequest {
    #[serde(rename = "JobHCL")]
    pub job_hcl: String,
}

/// Output stream of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame returned by the client log endpoint. `Data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFrame {
    #[serde(rename = "Data", default)]
    pub data: String,
    #[serde(rename = "File", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "Offset", default)]
    pub offset: u64,
}

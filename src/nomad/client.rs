//! Nomad control-plane client
//!
//! One method per endpoint used by a deploy. Job lookup has a recovery
//! path: a job unknown to the scheduler is rebuilt from its job file on a
//! host behind the gateway and parsed by the scheduler.

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde_json::Value;

use nomad_api::{
    paths, Allocation, Evaluation, JobSpec, JobSpecError, LogFrame, LogStream, ParseJobRequest,
    SubmitJobRequest, SubmitJobResponse,
};

use crate::tunnel::{RemoteShell, TunnelError};

use super::transport::{HttpTransport, TransportError};

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid job document: {0}")]
    InvalidJob(#[from] JobSpecError),

    #[error("Invalid log data for {task} {stream}: {reason}")]
    LogData {
        task: String,
        stream: LogStream,
        reason: String,
    },

    #[error("Remote command failed: {0}")]
    Remote(#[from] TunnelError),
}

/// Where job files live on the related service host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFileLocation {
    pub dir: String,
    pub extension: String,
}

impl JobFileLocation {
    pub fn path(&self, job_name: &str) -> String {
        format!(
            "{}/{}.{}",
            self.dir.trim_end_matches('/'),
            job_name,
            self.extension
        )
    }

    pub fn cat_command(&self, job_name: &str) -> String {
        format!("cat {}", self.path(job_name))
    }
}

impl Default for JobFileLocation {
    fn default() -> Self {
        Self {
            dir: "/etc/nomad/jobs.d".to_string(),
            extension: "nomad".to_string(),
        }
    }
}

/// Result of looking a job up
#[derive(Debug, Clone, PartialEq)]
pub enum JobLookup {
    /// Registered job returned by the scheduler
    Found(JobSpec),
    /// Job rebuilt from its job file through the parse endpoint
    Recovered(JobSpec),
    /// Neither the scheduler nor the job file produced a job
    Missing { reason: String },
}

impl JobLookup {
    pub fn into_spec(self) -> Option<JobSpec> {
        match self {
            JobLookup::Found(spec) | JobLookup::Recovered(spec) => Some(spec),
            JobLookup::Missing { .. } => None,
        }
    }
}

/// Typed control-plane client bound to a transport and a remote shell
pub struct NomadClient<'t> {
    http: &'t dyn HttpTransport,
    shell: &'t dyn RemoteShell,
    job_files: JobFileLocation,
}

impl<'t> NomadClient<'t> {
    pub fn new(http: &'t dyn HttpTransport, shell: &'t dyn RemoteShell) -> Self {
        Self {
            http,
            shell,
            job_files: JobFileLocation::default(),
        }
    }

    pub fn with_job_files(mut self, job_files: JobFileLocation) -> Self {
        self.job_files = job_files;
        self
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T, ClientError> {
        let body = self.http.get(path, query)?;
        decode(path, &body)
    }

    fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ClientError> {
        let response = self.http.post(path, body)?;
        decode(path, &response)
    }

    /// Fetch a job by name, falling back to the job file on `related_service`.
    ///
    /// Only a 404 triggers the fallback; any other transport failure is
    /// returned as an error.
    pub fn get_job(&self, name: &str, related_service: &str) -> Result<JobLookup, ClientError> {
        match self.get_json::<Value>(&paths::job(name), &[]) {
            Ok(value) => return Ok(JobLookup::Found(JobSpec::from_value(value)?)),
            Err(ClientError::Transport(e)) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tracing::warn!(
            job = name,
            host = related_service,
            path = %self.job_files.path(name),
            "job not registered, recovering it from its job file"
        );

        match self.recover_job(name, related_service) {
            Ok(spec) => Ok(JobLookup::Recovered(spec)),
            Err(e) => {
                tracing::warn!(job = name, error = %e, "job not found remotely either");
                Ok(JobLookup::Missing {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn recover_job(&self, name: &str, related_service: &str) -> Result<JobSpec, ClientError> {
        let job_hcl = self.shell.exec(related_service, &self.job_files.cat_command(name))?;
        self.parse_job(&job_hcl)
    }

    /// Turn raw job file text into a job document
    pub fn parse_job(&self, job_hcl: &str) -> Result<JobSpec, ClientError> {
        let body = serde_json::to_value(ParseJobRequest {
            job_hcl: job_hcl.to_string(),
        })
        .map_err(TransportError::from)?;
        let value: Value = self.post_json(paths::jobs_parse(), &body)?;
        Ok(JobSpec::from_value(value)?)
    }

    /// Register the job, enforcing its modify index when it carries one
    pub fn submit_job(&self, spec: &JobSpec) -> Result<SubmitJobResponse, ClientError> {
        let name = spec
            .name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| JobSpecError::MissingField("Name".to_string()))?;
        let body = serde_json::to_value(SubmitJobRequest::for_job(spec.clone()))
            .map_err(TransportError::from)?;
        self.post_json(&paths::job(name), &body)
    }

    pub fn get_evaluation(&self, id: &str) -> Result<Evaluation, ClientError> {
        self.get_json(&paths::evaluation(id), &[])
    }

    pub fn get_allocations_for_evaluation(&self, id: &str) -> Result<Vec<Allocation>, ClientError> {
        self.get_json(&paths::evaluation_allocations(id), &[])
    }

    pub fn get_allocation(&self, id: &str) -> Result<Allocation, ClientError> {
        self.get_json(&paths::allocation(id), &[])
    }

    /// Fetch and decode one task log stream
    pub fn try_get_fs_log(
        &self,
        allocation_id: &str,
        task: &str,
        stream: LogStream,
    ) -> Result<String, ClientError> {
        let path = paths::client_fs_logs(allocation_id);
        let body = self
            .http
            .get(&path, &paths::client_fs_logs_query(task, stream))?;

        // The endpoint may answer with several concatenated frames
        let mut bytes = Vec::new();
        for frame in serde_json::Deserializer::from_str(&body).into_iter::<LogFrame>() {
            let frame = frame.map_err(|source| ClientError::Decode {
                path: path.clone(),
                source,
            })?;
            let chunk = base64::engine::general_purpose::STANDARD
                .decode(frame.data.trim())
                .map_err(|e| ClientError::LogData {
                    task: task.to_string(),
                    stream,
                    reason: e.to_string(),
                })?;
            bytes.extend(chunk);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fetch one task log stream; failures yield an empty string
    pub fn get_fs_log(&self, allocation_id: &str, task: &str, stream: LogStream) -> String {
        match self.try_get_fs_log(allocation_id, task, stream) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(
                    allocation = allocation_id,
                    task,
                    %stream,
                    error = %e,
                    "failed to fetch allocation log"
                );
                String::new()
            }
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|source| ClientError::Decode {
        path: path.to_string(),
        source,
    })
}

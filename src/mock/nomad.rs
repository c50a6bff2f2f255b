//! Mock Nomad server and gateway shell

use std::collections::HashMap;
use std::sync::Mutex;

use base64::Engine as _;
use serde_json::{json, Value};

use nomad_api::{evaluation, LogStream};

use crate::nomad::{HttpTransport, TransportError};
use crate::tunnel::{RemoteShell, TunnelError};

use super::failure::{FailureConfig, FailureInjector};

/// Sequence of statuses; the last one repeats once reached
#[derive(Debug, Clone)]
struct Script {
    statuses: Vec<String>,
    cursor: usize,
}

impl Script {
    fn new(statuses: &[&str]) -> Self {
        Self {
            statuses: statuses.iter().map(|s| s.to_string()).collect(),
            cursor: 0,
        }
    }

    fn next(&mut self) -> Option<String> {
        let status = self
            .statuses
            .get(self.cursor)
            .or_else(|| self.statuses.last())
            .cloned();
        self.cursor += 1;
        status
    }
}

#[derive(Debug, Default)]
struct MockState {
    jobs: HashMap<String, Value>,
    /// (host, path) -> (raw job file, parsed job)
    job_files: HashMap<(String, String), (String, Value)>,
    submissions: HashMap<String, Vec<Value>>,
    eval_ids: HashMap<String, String>,
    evaluations: HashMap<String, Script>,
    submitted_evals: Vec<String>,
    eval_allocations: HashMap<String, Vec<Value>>,
    allocations: HashMap<String, Value>,
    allocation_scripts: HashMap<String, Script>,
    logs: HashMap<(String, String, LogStream), String>,
    failures: FailureInjector,
    requests: Vec<String>,
    remote_commands: Vec<(String, String)>,
    index: u64,
}

/// In-process fake control plane
///
/// Implements both [`HttpTransport`] and [`RemoteShell`], so one instance
/// can back a [`crate::nomad::NomadClient`] on its own.
#[derive(Debug, Default)]
pub struct MockNomad {
    state: Mutex<MockState>,
}

/// Build an allocation stub with pending tasks
pub fn allocation(id: &str, task_group: &str, tasks: &[&str]) -> Value {
    let task_states: serde_json::Map<String, Value> = tasks
        .iter()
        .map(|t| (t.to_string(), json!({"State": "pending", "Failed": false})))
        .collect();
    json!({
        "ID": id,
        "Name": format!("{}[0]", task_group),
        "TaskGroup": task_group,
        "ClientStatus": "pending",
        "TaskStates": task_states,
    })
}

/// Base64-encode log text the way the client log endpoint does
pub fn encode_log(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

impl MockNomad {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    // === Configuration ===

    /// Register a job so `GET /v1/job/{name}` finds it
    pub fn register_job(&self, name: &str, job: Value) {
        self.with_state(|s| s.jobs.insert(name.to_string(), job));
    }

    /// Place a job file on `host` and teach the parse endpoint its result
    pub fn add_job_file(&self, host: &str, path: &str, raw: &str, parsed: Value) {
        self.with_state(|s| {
            s.job_files
                .insert((host.to_string(), path.to_string()), (raw.to_string(), parsed))
        });
    }

    /// Evaluation ID returned when `job` is submitted
    pub fn set_eval_id(&self, job: &str, eval_id: &str) {
        self.with_state(|s| s.eval_ids.insert(job.to_string(), eval_id.to_string()));
    }

    /// Statuses returned by successive evaluation reads
    pub fn set_evaluation_statuses(&self, eval_id: &str, statuses: &[&str]) {
        self.with_state(|s| s.evaluations.insert(eval_id.to_string(), Script::new(statuses)));
    }

    /// Allocations placed by an evaluation
    pub fn set_allocations(&self, eval_id: &str, allocations: Vec<Value>) {
        self.with_state(|s| {
            for alloc in &allocations {
                if let Some(id) = alloc["ID"].as_str() {
                    s.allocations.insert(id.to_string(), alloc.clone());
                }
            }
            s.eval_allocations.insert(eval_id.to_string(), allocations);
        });
    }

    /// Client statuses returned by successive allocation reads
    pub fn set_allocation_statuses(&self, alloc_id: &str, statuses: &[&str]) {
        self.with_state(|s| {
            s.allocation_scripts
                .insert(alloc_id.to_string(), Script::new(statuses))
        });
    }

    /// Serve `data` (already base64) as a single log frame
    pub fn set_log(&self, alloc_id: &str, task: &str, stream: LogStream, data: &str) {
        self.set_raw_log(alloc_id, task, stream, &json!({"Data": data, "Offset": 0}).to_string());
    }

    /// Serve `body` verbatim from the log endpoint
    pub fn set_raw_log(&self, alloc_id: &str, task: &str, stream: LogStream, body: &str) {
        self.with_state(|s| {
            s.logs
                .insert((alloc_id.to_string(), task.to_string(), stream), body.to_string())
        });
    }

    /// Answer every request to `path` with `status`
    pub fn fail_path(&self, path: &str, status: u16) {
        self.inject_failure(path, FailureConfig::status(status));
    }

    /// `key` is a path or `METHOD path`
    pub fn inject_failure(&self, key: &str, config: FailureConfig) {
        self.with_state(|s| s.failures.set(key, config));
    }

    // === Inspection ===

    /// Requests served so far, as `METHOD path[?query]`
    pub fn requests(&self) -> Vec<String> {
        self.with_state(|s| s.requests.clone())
    }

    /// Number of requests whose path starts with `prefix`
    pub fn request_count(&self, method: &str, prefix: &str) -> usize {
        let needle = format!("{} {}", method, prefix);
        self.with_state(|s| s.requests.iter().filter(|r| r.starts_with(&needle)).count())
    }

    pub fn remote_commands(&self) -> Vec<(String, String)> {
        self.with_state(|s| s.remote_commands.clone())
    }

    /// Most recent registration body for `job`
    pub fn last_submission(&self, job: &str) -> Option<Value> {
        self.with_state(|s| s.submissions.get(job).and_then(|v| v.last().cloned()))
    }

    // === Handlers ===

    fn handle_get(state: &mut MockState, path: &str, query: &[(String, String)]) -> Result<Value, TransportError> {
        let not_found = || TransportError::NotFound {
            path: path.to_string(),
        };

        if let Some(rest) = path.strip_prefix("/v1/evaluation/") {
            if let Some(eval_id) = rest.strip_suffix("/allocations") {
                let allocs = state.eval_allocations.get(eval_id).cloned().unwrap_or_default();
                return Ok(Value::Array(allocs));
            }
            let status = match state.evaluations.get_mut(rest) {
                Some(script) => script.next(),
                None if state.submitted_evals.iter().any(|e| e == rest) => {
                    Some(evaluation::status::COMPLETE.to_string())
                }
                None => None,
            }
            .ok_or_else(not_found)?;
            return Ok(json!({"ID": rest, "Status": status}));
        }

        if let Some(alloc_id) = path.strip_prefix("/v1/allocation/") {
            let mut alloc = state.allocations.get(alloc_id).cloned().ok_or_else(not_found)?;
            if let Some(status) = state.allocation_scripts.get_mut(alloc_id).and_then(Script::next) {
                alloc["ClientStatus"] = Value::String(status);
            }
            return Ok(alloc);
        }

        if let Some(alloc_id) = path.strip_prefix("/v1/client/fs/logs/") {
            let param = |name: &str| {
                query
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            };
            let stream = match param("type").as_str() {
                "stderr" => LogStream::Stderr,
                _ => LogStream::Stdout,
            };
            let key = (alloc_id.to_string(), param("task"), stream);
            let body = state.logs.get(&key).cloned().ok_or_else(not_found)?;
            // Raw log bodies may hold several frames; hand them back as a string
            return Ok(Value::String(body));
        }

        if let Some(name) = path.strip_prefix("/v1/job/") {
            return state.jobs.get(name).cloned().ok_or_else(not_found);
        }

        Err(not_found())
    }

    fn handle_post(state: &mut MockState, path: &str, body: &Value) -> Result<Value, TransportError> {
        if path == "/v1/jobs/parse" {
            let raw = body["JobHCL"].as_str().unwrap_or_default();
            return state
                .job_files
                .values()
                .find(|(content, _)| content == raw)
                .map(|(_, parsed)| parsed.clone())
                .ok_or_else(|| TransportError::Status {
                    path: path.to_string(),
                    status: 400,
                    body: "error parsing job file".to_string(),
                });
        }

        if let Some(name) = path.strip_prefix("/v1/job/") {
            state
                .submissions
                .entry(name.to_string())
                .or_default()
                .push(body.clone());
            state.index += 1;
            let eval_id = state
                .eval_ids
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("eval-{}-{}", name, state.index));
            state.submitted_evals.push(eval_id.clone());
            return Ok(json!({
                "EvalID": eval_id,
                "EvalCreateIndex": state.index,
                "JobModifyIndex": state.index,
                "Warnings": ""
            }));
        }

        Err(TransportError::NotFound {
            path: path.to_string(),
        })
    }
}

impl HttpTransport for MockNomad {
    fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, TransportError> {
        self.with_state(|s| {
            let line = if query.is_empty() {
                format!("GET {}", path)
            } else {
                let q: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("GET {}?{}", path, q.join("&"))
            };
            s.requests.push(line);

            if let Some(err) = s.failures.check("GET", path) {
                return Err(err);
            }
            match Self::handle_get(s, path, query)? {
                Value::String(raw) => Ok(raw),
                value => Ok(value.to_string()),
            }
        })
    }

    fn post(&self, path: &str, body: &Value) -> Result<String, TransportError> {
        self.with_state(|s| {
            s.requests.push(format!("POST {}", path));

            if let Some(err) = s.failures.check("POST", path) {
                return Err(err);
            }
            Self::handle_post(s, path, body).map(|v| v.to_string())
        })
    }
}

impl RemoteShell for MockNomad {
    fn exec(&self, host: &str, command: &str) -> Result<String, TunnelError> {
        self.with_state(|s| {
            s.remote_commands.push((host.to_string(), command.to_string()));

            let path = command.strip_prefix("cat ").unwrap_or(command);
            s.job_files
                .get(&(host.to_string(), path.to_string()))
                .map(|(raw, _)| raw.clone())
                .ok_or_else(|| TunnelError::RemoteCommand {
                    host: host.to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: format!("cat: {}: No such file or directory", path),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_repeats_last_status() {
        let mut script = Script::new(&["pending", "complete"]);
        assert_eq!(script.next().as_deref(), Some("pending"));
        assert_eq!(script.next().as_deref(), Some("complete"));
        assert_eq!(script.next().as_deref(), Some("complete"));
    }

    #[test]
    fn test_allocation_builder() {
        let alloc = allocation("a1", "api", &["server", "sidecar"]);
        assert_eq!(alloc["TaskGroup"], "api");
        assert_eq!(alloc["ClientStatus"], "pending");
        assert!(alloc["TaskStates"].get("sidecar").is_some());
    }

    #[test]
    fn test_allocation_status_script() {
        let nomad = MockNomad::new();
        nomad.set_allocations("e1", vec![allocation("a1", "api", &["server"])]);
        nomad.set_allocation_statuses("a1", &["running", "complete"]);

        let first: Value = serde_json::from_str(&nomad.get("/v1/allocation/a1", &[]).unwrap()).unwrap();
        let second: Value = serde_json::from_str(&nomad.get("/v1/allocation/a1", &[]).unwrap()).unwrap();
        assert_eq!(first["ClientStatus"], "running");
        assert_eq!(second["ClientStatus"], "complete");
        assert_eq!(nomad.request_count("GET", "/v1/allocation/"), 2);
    }

    #[test]
    fn test_unknown_evaluation_is_not_found() {
        let nomad = MockNomad::new();
        assert!(nomad.get("/v1/evaluation/nope", &[]).unwrap_err().is_not_found());
    }
}

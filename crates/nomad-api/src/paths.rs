//! Endpoint paths.

use crate::request::LogStream;

pub fn job(name: &str) -> String {
    format!("/v1/job/{}", name)
}

pub fn jobs_parse() -> &'static str {
    "/v1/jobs/parse"
}

pub fn evaluation(id: &str) -> String {
    format!("/v1/evaluation/{}", id)
}

pub fn evaluation_allocations(id: &str) -> String {
    format!("/v1/evaluation/{}/allocations", id)
}

pub fn allocation(id: &str) -> String {
    format!("/v1/allocation/{}", id)
}

pub fn client_fs_logs(allocation_id: &str) -> String {
    format!("/v1/client/fs/logs/{}", allocation_id)
}

/// Query parameters for [`client_fs_logs`].
pub fn client_fs_logs_query(task: &str, stream: LogStream) -> Vec<(String, String)> {
    vec![
        ("type".to_string(), stream.as_str().to_string()),
        ("task".to_string(), task.to_string()),
    ]
}

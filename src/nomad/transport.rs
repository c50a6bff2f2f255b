//! HTTP transport
//!
//! Abstracts the HTTP connection to the control plane for testability:
//! - HttpTransport trait: GET/POST returning the raw response body
//! - ReqwestTransport: blocking reqwest client bound to a base URL
//!
//! The in-process fake lives in `crate::mock`.

use std::time::Duration;

use serde_json::Value;

/// Transport trait for control-plane requests
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and return the response body
    fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, TransportError>;

    /// Issue a POST with a JSON body and return the response body
    fn post(&self, path: &str, body: &Value) -> Result<String, TransportError>;
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint answered 404. Kept apart from other statuses because the
    /// job lookup treats it as a signal, not a failure.
    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("HTTP {status} from {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }
}

/// Blocking HTTP transport
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` (e.g. `http://127.0.0.1:4646`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("nomad-deploy/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn read(path: &str, response: reqwest::blocking::Response) -> Result<String, TransportError> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| TransportError::Connection(format!("Failed to read body from {}: {}", path, e)))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, TransportError> {
        tracing::debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .map_err(|e| TransportError::Connection(format!("GET {}: {}", path, e)))?;
        Self::read(path, response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<String, TransportError> {
        tracing::debug!(path, "POST");
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .map_err(|e| TransportError::Connection(format!("POST {}: {}", path, e)))?;
        Self::read(path, response)
    }
}

//! Failure Injection for Mock Control Plane

use std::collections::HashMap;

use crate::nomad::TransportError;

/// Failure configuration for a request path
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// HTTP status to answer with; `None` simulates a dropped connection
    pub status: Option<u16>,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            fail_count: None,
        }
    }

    pub fn connection() -> Self {
        Self {
            status: None,
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Tracks configured failures and how often each has fired
///
/// Keys are either a bare path, matching every method, or `METHOD path`.
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<String, FailureConfig>,
    fired: HashMap<String, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, config: FailureConfig) {
        self.configs.insert(path.into(), config);
    }

    /// Return the error to inject for `method path`, if any
    pub fn check(&mut self, method: &str, path: &str) -> Option<TransportError> {
        let qualified = format!("{} {}", method, path);
        let key = if self.configs.contains_key(&qualified) {
            qualified
        } else {
            path.to_string()
        };

        let config = self.configs.get(&key)?;
        let fired = self.fired.entry(key).or_insert(0);
        if config.fail_count.is_some_and(|limit| *fired >= limit) {
            return None;
        }
        *fired += 1;

        Some(match config.status {
            Some(404) => TransportError::NotFound {
                path: path.to_string(),
            },
            Some(status) => TransportError::Status {
                path: path.to_string(),
                status,
                body: "injected failure".to_string(),
            },
            None => TransportError::Connection(format!("injected connection failure on {}", path)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_fails() {
        let mut injector = FailureInjector::new();
        injector.set("/v1/job/web", FailureConfig::status(500));

        for _ in 0..3 {
            assert!(matches!(
                injector.check("GET", "/v1/job/web"),
                Some(TransportError::Status { status: 500, .. })
            ));
        }
        assert!(injector.check("GET", "/v1/job/api").is_none());
    }

    #[test]
    fn test_fail_count() {
        let mut injector = FailureInjector::new();
        injector.set("/v1/allocation/a1", FailureConfig::connection().with_fail_count(2));

        assert!(injector.check("GET", "/v1/allocation/a1").is_some());
        assert!(injector.check("GET", "/v1/allocation/a1").is_some());
        assert!(injector.check("GET", "/v1/allocation/a1").is_none());
    }

    #[test]
    fn test_not_found_status() {
        let mut injector = FailureInjector::new();
        injector.set("/v1/job/web", FailureConfig::status(404));

        assert!(injector.check("GET", "/v1/job/web").unwrap().is_not_found());
    }

    #[test]
    fn test_method_qualified_key() {
        let mut injector = FailureInjector::new();
        injector.set("POST /v1/job/web", FailureConfig::status(409));

        assert!(injector.check("GET", "/v1/job/web").is_none());
        assert!(matches!(
            injector.check("POST", "/v1/job/web"),
            Some(TransportError::Status { status: 409, .. })
        ));
    }
}

//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// OpenSSH client binary (default: ssh)
    pub ssh_program: String,

    /// SSH port on the gateway (default: 22)
    pub ssh_port: u16,

    /// Private key used for the gateway and hosts behind it (default: /id_rsa)
    pub ssh_key_path: String,

    /// Control-plane address as seen from the gateway
    pub nomad_address: String,

    /// Control-plane port as seen from the gateway (default: 4646)
    pub nomad_port: u16,

    /// Directory holding job files on the related service host
    pub job_dir: String,

    /// Job file extension (default: "nomad")
    pub job_extension: String,

    /// Host holding job files when none is given
    pub related_service: String,

    /// Environment variable names that receive the deployed tag
    pub version_var: String,
    pub release_var: String,

    /// Stop waiting on failed or canceled evaluations (default: true)
    pub strict_evaluation: bool,

    /// Poll interval in milliseconds (default: 1000)
    pub poll_interval_ms: u64,

    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_seconds: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            ssh_port: 22,
            ssh_key_path: "/id_rsa".to_string(),
            nomad_address: nomad_api::DEFAULT_ADDRESS.to_string(),
            nomad_port: nomad_api::DEFAULT_PORT,
            job_dir: "/etc/nomad/jobs.d".to_string(),
            job_extension: "nomad".to_string(),
            related_service: nomad_api::DEFAULT_ADDRESS.to_string(),
            version_var: "DD_VERSION".to_string(),
            release_var: "RELEASE_VERSION".to_string(),
            strict_evaluation: true,
            poll_interval_ms: 1000,
            connect_timeout_seconds: 30,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "ssh": {
                "program": self.ssh_program,
                "port": self.ssh_port,
                "key_path": self.ssh_key_path
            },
            "nomad": {
                "address": self.nomad_address,
                "port": self.nomad_port,
                "job_dir": self.job_dir,
                "job_extension": self.job_extension
            },
            "deploy": {
                "related_service": self.related_service,
                "strict_evaluation": self.strict_evaluation,
                "version_env": {
                    "version_var": self.version_var,
                    "release_var": self.release_var
                }
            },
            "timeouts": {
                "poll_interval_ms": self.poll_interval_ms,
                "connect_timeout_seconds": self.connect_timeout_seconds
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.ssh_key_path, "/id_rsa");
        assert_eq!(defaults.nomad_port, 4646);
        assert_eq!(defaults.related_service, "nomad.service.consul");
        assert!(defaults.strict_evaluation);
    }

    #[test]
    fn test_to_value_sections() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["ssh"]["port"], 22);
        assert_eq!(value["ssh"]["program"], "ssh");
        assert_eq!(value["nomad"]["job_dir"], "/etc/nomad/jobs.d");
        assert_eq!(value["deploy"]["version_env"]["release_var"], "RELEASE_VERSION");
        assert_eq!(value["timeouts"]["poll_interval_ms"], 1000);
        assert!(value["timeouts"].get("max_poll_interval_ms").is_none());
        assert!(value["timeouts"].get("evaluation_timeout_seconds").is_none());
    }
}

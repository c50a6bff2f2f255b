//! Typed view of the merged configuration

use serde::{Deserialize, Serialize};

use crate::deploy::{DeployOptions, DeployRequest};
use crate::job::VersionEnv;
use crate::nomad::{JobFileLocation, PollOptions};
use crate::timeout::TimeoutConfig;
use crate::tunnel::SshConfig;

use super::ConfigError;

/// Gateway connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub program: String,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub key_path: String,
}

/// Control plane as seen from the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NomadSettings {
    pub address: String,
    pub port: u16,
    /// Shown to the operator, never contacted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_url: Option<String>,
    pub job_dir: String,
    pub job_extension: String,
}

/// What to deploy and how to wait for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub job: String,
    pub image: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub related_service: String,
    pub strict_evaluation: bool,
    pub version_env: VersionEnv,
}

/// Complete deploy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub ssh: SshSettings,
    pub nomad: NomadSettings,
    pub deploy: DeploySettings,
    pub timeouts: TimeoutConfig,
}

impl DeployConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timeouts.validate()?;
        if self.ssh.port == 0 || self.nomad.port == 0 {
            return Err(ConfigError::ValidationError("ports must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Check that everything a deploy needs is present
    pub fn validate_for_deploy(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let required = [
            ("ssh.user", &self.ssh.user),
            ("ssh.host", &self.ssh.host),
            ("deploy.job", &self.deploy.job),
            ("deploy.image", &self.deploy.image),
            ("deploy.tag", &self.deploy.tag),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing.join(", ")));
        }
        Ok(())
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            program: self.ssh.program.clone(),
            host: self.ssh.host.clone(),
            user: self.ssh.user.clone(),
            port: self.ssh.port,
            key_path: self.ssh.key_path.clone(),
            remote_address: self.nomad.address.clone(),
            remote_port: self.nomad.port,
            connect_timeout: self.timeouts.connect_timeout(),
            ..SshConfig::default()
        }
    }

    pub fn job_files(&self) -> JobFileLocation {
        JobFileLocation {
            dir: self.nomad.job_dir.clone(),
            extension: self.nomad.job_extension.clone(),
        }
    }

    pub fn deploy_options(&self) -> DeployOptions {
        let poll = PollOptions::every(self.timeouts.poll_interval())
            .with_max_interval(self.timeouts.max_poll_interval());

        DeployOptions {
            evaluation_poll: poll.with_timeout(self.timeouts.evaluation_timeout()),
            allocation_poll: poll.with_timeout(self.timeouts.allocation_timeout()),
            strict_evaluation: self.deploy.strict_evaluation,
        }
    }

    /// Build the deploy request; the SSH user is recorded as the deployer
    pub fn request(&self) -> DeployRequest {
        let related_service = if self.deploy.related_service.trim().is_empty() {
            nomad_api::DEFAULT_ADDRESS.to_string()
        } else {
            self.deploy.related_service.clone()
        };

        DeployRequest {
            job_name: self.deploy.job.clone(),
            image: self.deploy.image.clone(),
            tag: self.deploy.tag.clone(),
            wait_status: self.deploy.wait_status.clone(),
            task_group: self.deploy.task_group.clone(),
            user: Some(self.ssh.user.clone()),
            branch: self.deploy.branch.clone(),
            related_service,
            version_env: self.deploy.version_env.clone(),
        }
    }
}

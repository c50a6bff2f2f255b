//! Nomad deploys over an SSH tunnel
//!
//! Opens a forward to the control plane through a gateway host, rewrites a
//! job's image and tag, submits it and optionally waits until every
//! allocation reaches a target status. Failed allocations come back with
//! their task logs.

pub mod config;
pub mod deploy;
pub mod job;
pub mod mock;
pub mod nomad;
pub mod signal;
pub mod summary;
pub mod telemetry;
pub mod timeout;
pub mod tunnel;

pub use config::{ConfigError, DeployConfig, EffectiveConfig};
pub use deploy::{
    deploy, DeployFailure, DeployOptions, DeployReport, DeployRequest, DeploySuccess, Deployer,
    Diagnostics, FailureKind, Outcome, TaskLogs,
};
pub use job::{apply_deploy_metadata, apply_image_tag, VersionEnv};
pub use nomad::{poll_until, JobLookup, NomadClient, PollOptions, PollOutcome};
pub use signal::{CancelToken, SignalHandler};
pub use tunnel::{with_tunnel, SshConfig, SshTunnel};

//! Deploy orchestration
//!
//! [`deploy`] opens the tunnel, runs a [`Deployer`] inside it and always
//! closes the tunnel before returning a single [`Outcome`].

mod orchestrator;
mod outcome;
mod state;

pub use orchestrator::{DeployOptions, DeployRequest, Deployer};
pub use outcome::{
    DeployFailure, DeploySuccess, Diagnostics, FailureKind, Outcome, TaskLogs, NOTHING_WAS_RUN,
};
pub use state::{DeployState, DeployStateError, StateMachine, Transition};

use crate::config::DeployConfig;
use crate::signal::CancelToken;
use crate::tunnel::with_tunnel;

/// Outcome of a deploy plus the states it went through
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub outcome: Outcome,
    pub transitions: Vec<Transition>,
}

impl DeployReport {
    fn failed(failure: DeployFailure) -> Self {
        Self {
            outcome: Outcome::Error(failure),
            transitions: Vec::new(),
        }
    }
}

/// Run a full deploy described by `config`
pub fn deploy(config: &DeployConfig, cancel: CancelToken) -> DeployReport {
    if let Err(e) = config.validate_for_deploy() {
        return DeployReport::failed(DeployFailure::new(FailureKind::InvalidConfig, e.to_string()));
    }

    let ssh = config.ssh_config();
    let request = config.request();
    tracing::info!(
        gateway = %format!("ssh://{}@{}", ssh.user, ssh.host),
        job = %request.job_name,
        related_service = %request.related_service,
        "opening tunnel"
    );

    let result = with_tunnel(ssh, |tunnel| {
        cancel.track_child(tunnel.pid());
        let client = tunnel.client(config.job_files());
        let mut deployer = Deployer::new(&client, config.deploy_options(), cancel.clone());
        let outcome = deployer.run(&request);
        cancel.untrack_child(tunnel.pid());
        DeployReport {
            outcome,
            transitions: deployer.history().to_vec(),
        }
    });

    match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "tunnel unavailable");
            DeployReport::failed(DeployFailure::tunnel(e))
        }
    }
}

//! nomad-deploy CLI
//!
//! Entry point for the `nomad-deploy` command-line tool.

use std::path::PathBuf;
use std::process;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use nomad_deploy::config::EffectiveConfig;
use nomad_deploy::deploy::{deploy, FailureKind};
use nomad_deploy::signal::SignalHandler;
use nomad_deploy::summary::{render, DeploySummary};
use nomad_deploy::telemetry;

#[derive(Parser)]
#[command(name = "nomad-deploy")]
#[command(about = "Deploy container images to Nomad through an SSH gateway", version)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "NOMAD_DEPLOY_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update a job's image and tag, submit it and optionally wait for it
    Deploy {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Print a JSON summary instead of the human report
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

#[derive(Args, Debug, Default)]
struct SettingsArgs {
    /// Config file (default: ~/.config/nomad-deploy/config.toml when present)
    #[arg(long, short = 'c', env = "NOMAD_DEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// User on the gateway; also recorded as the deployer
    #[arg(long, env = "SSH_USER")]
    ssh_user: Option<String>,

    /// Gateway host
    #[arg(long, env = "SSH_HOST")]
    ssh_host: Option<String>,

    #[arg(long, env = "SSH_PORT")]
    ssh_port: Option<u16>,

    /// Private key for the gateway and hosts behind it
    #[arg(long, env = "SSH_KEY_PATH")]
    ssh_key: Option<String>,

    /// Container image without tag
    #[arg(long, env = "DOCKER_IMAGE")]
    image: Option<String>,

    #[arg(long, env = "TAG")]
    tag: Option<String>,

    /// Client status every allocation must reach; empty submits without waiting
    #[arg(long, env = "WAIT_STATUS")]
    wait_status: Option<String>,

    /// Only wait on allocations of this task group
    #[arg(long, env = "WAIT_TASK_GROUP")]
    task_group: Option<String>,

    #[arg(long, env = "BRANCH_NAME")]
    branch: Option<String>,

    /// Job to deploy
    #[arg(long, env = "JOB_NAME")]
    job: Option<String>,

    /// Control-plane UI shown in the progress output
    #[arg(long, env = "NOMAD_URL")]
    nomad_url: Option<String>,

    /// Host holding job files for jobs the scheduler does not know
    #[arg(long, env = "JOB_RELATED_SERVICE")]
    related_service: Option<String>,

    #[arg(long, env = "NOMAD_DEPLOY_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    #[arg(long, env = "NOMAD_DEPLOY_MAX_POLL_INTERVAL_MS")]
    max_poll_interval_ms: Option<u64>,

    #[arg(long, env = "NOMAD_DEPLOY_EVALUATION_TIMEOUT")]
    evaluation_timeout_seconds: Option<u64>,

    #[arg(long, env = "NOMAD_DEPLOY_ALLOCATION_TIMEOUT")]
    allocation_timeout_seconds: Option<u64>,

    #[arg(long, env = "NOMAD_DEPLOY_CONNECT_TIMEOUT")]
    connect_timeout_seconds: Option<u64>,

    /// Keep waiting when the evaluation fails or is canceled
    #[arg(long)]
    lenient_evaluation: bool,
}

impl SettingsArgs {
    /// Flags as a config layer; unset flags are null and get dropped
    fn overrides(&self) -> Value {
        json!({
            "ssh": {
                "user": self.ssh_user,
                "host": self.ssh_host,
                "port": self.ssh_port,
                "key_path": self.ssh_key,
            },
            "nomad": {
                "ui_url": self.nomad_url,
            },
            "deploy": {
                "job": self.job,
                "image": self.image,
                "tag": self.tag,
                "wait_status": self.wait_status,
                "task_group": self.task_group,
                "branch": self.branch,
                "related_service": self.related_service,
                "strict_evaluation": self.lenient_evaluation.then_some(false),
            },
            "timeouts": {
                "poll_interval_ms": self.poll_interval_ms,
                "max_poll_interval_ms": self.max_poll_interval_ms,
                "evaluation_timeout_seconds": self.evaluation_timeout_seconds,
                "allocation_timeout_seconds": self.allocation_timeout_seconds,
                "connect_timeout_seconds": self.connect_timeout_seconds,
            }
        })
    }

    fn load(&self) -> EffectiveConfig {
        let path = EffectiveConfig::resolve_path(self.config.clone());
        match EffectiveConfig::build(path.as_deref(), Some(self.overrides())) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                process::exit(FailureKind::InvalidConfig.exit_code());
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, telemetry::level_for(cli.verbose));

    match cli.command {
        Commands::Deploy { settings, json } => run_deploy(&settings, json),
        Commands::Config { settings } => run_config(&settings),
    }
}

fn run_deploy(args: &SettingsArgs, json: bool) {
    let effective = args.load();
    let config = effective.settings();
    let request = config.request();

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    if !json {
        println!(
            "Executing '{}' job into {} through ssh://{}@{}",
            request.job_name, request.related_service, config.ssh.user, config.ssh.host
        );
        if let Some(url) = config.nomad.ui_url.as_deref().filter(|u| !u.is_empty()) {
            println!("You can check the progress in {}", url);
        }
    }

    let started_at = Utc::now();
    let report = deploy(config, signals.token());
    let exit_code = report.outcome.exit_code();

    if json {
        let summary = DeploySummary::new(&request, report.outcome, started_at)
            .with_ui_url(config.nomad.ui_url.clone())
            .with_transitions(report.transitions);
        match summary.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", render(&request.job_name, &report.outcome));
    }

    process::exit(exit_code);
}

fn run_config(args: &SettingsArgs) {
    let effective = args.load();
    match effective.to_json() {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_deploy_flags() {
        let cli = Cli::try_parse_from([
            "nomad-deploy",
            "deploy",
            "--ssh-user",
            "deploy",
            "--ssh-host",
            "bastion",
            "--image",
            "registry/app",
            "--tag",
            "v2",
            "--job",
            "web",
            "--wait-status",
            "running",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Deploy { settings, json } => {
                assert!(json);
                let overrides = settings.overrides();
                assert_eq!(overrides["deploy"]["image"], "registry/app");
                assert_eq!(overrides["deploy"]["wait_status"], "running");
                assert!(overrides["deploy"]["strict_evaluation"].is_null());
            }
            Commands::Config { .. } => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_overrides_merge_into_config() {
        let args = SettingsArgs {
            ssh_user: Some("ci".to_string()),
            tag: Some("v3".to_string()),
            lenient_evaluation: true,
            poll_interval_ms: Some(250),
            ..SettingsArgs::default()
        };

        let config = EffectiveConfig::build(None, Some(args.overrides())).unwrap();
        let settings = config.settings();

        assert_eq!(settings.ssh.user, "ci");
        assert_eq!(settings.ssh.key_path, "/id_rsa");
        assert_eq!(settings.deploy.tag, "v3");
        assert!(!settings.deploy.strict_evaluation);
        assert_eq!(settings.timeouts.max_poll_interval_ms, 250);
    }
}

//! Deploy orchestrator
//!
//! Drives one deploy through fetch, mutate, submit and the two waits.
//! Allocations are watched one at a time in list order and the first
//! failure ends the deploy.

use std::collections::BTreeMap;

use nomad_api::allocation::client_status;
use nomad_api::{Allocation, Evaluation, LogStream, SubmitJobResponse};

use crate::job::{apply_deploy_metadata, apply_image_tag_with, VersionEnv};
use crate::nomad::{poll_until, ClientError, JobLookup, NomadClient, PollOptions, PollOutcome};
use crate::signal::CancelToken;

use super::outcome::{DeployFailure, DeploySuccess, Diagnostics, FailureKind, Outcome, TaskLogs};
use super::state::{DeployState, StateMachine, Transition};

/// What to deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub job_name: String,
    pub image: String,
    pub tag: String,
    /// Client status every allocation must reach; `None` or empty submits
    /// without waiting
    pub wait_status: Option<String>,
    /// Only watch allocations of this task group
    pub task_group: Option<String>,
    pub user: Option<String>,
    pub branch: Option<String>,
    /// Host holding job files for jobs the scheduler does not know
    pub related_service: String,
    pub version_env: VersionEnv,
}

impl DeployRequest {
    pub fn new(job_name: impl Into<String>, image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            image: image.into(),
            tag: tag.into(),
            wait_status: None,
            task_group: None,
            user: None,
            branch: None,
            related_service: nomad_api::DEFAULT_ADDRESS.to_string(),
            version_env: VersionEnv::default(),
        }
    }

    pub fn wait_for(mut self, status: impl Into<String>) -> Self {
        self.wait_status = Some(status.into());
        self
    }

    pub fn in_task_group(mut self, task_group: impl Into<String>) -> Self {
        self.task_group = Some(task_group.into());
        self
    }

    pub fn deployed_by(mut self, user: impl Into<String>, branch: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.branch = Some(branch.into());
        self
    }

    pub fn with_related_service(mut self, host: impl Into<String>) -> Self {
        self.related_service = host.into();
        self
    }

    fn wait_status(&self) -> Option<&str> {
        self.wait_status.as_deref().filter(|s| !s.is_empty())
    }

    fn task_group(&self) -> Option<&str> {
        self.task_group.as_deref().filter(|s| !s.is_empty())
    }
}

/// How the waits behave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub evaluation_poll: PollOptions,
    pub allocation_poll: PollOptions,
    /// Treat failed or canceled evaluations as fatal instead of waiting on
    pub strict_evaluation: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            evaluation_poll: PollOptions::default(),
            allocation_poll: PollOptions::default(),
            strict_evaluation: true,
        }
    }
}

/// Runs a deploy against a control-plane client
pub struct Deployer<'c, 't> {
    client: &'c NomadClient<'t>,
    options: DeployOptions,
    cancel: CancelToken,
    machine: StateMachine,
}

impl<'c, 't> Deployer<'c, 't> {
    pub fn new(client: &'c NomadClient<'t>, options: DeployOptions, cancel: CancelToken) -> Self {
        Self {
            client,
            options,
            cancel,
            machine: StateMachine::new(),
        }
    }

    pub fn state(&self) -> DeployState {
        self.machine.state()
    }

    pub fn history(&self) -> &[Transition] {
        self.machine.history()
    }

    /// States visited by the last run
    pub fn path(&self) -> Vec<DeployState> {
        self.machine.path()
    }

    /// Run the deploy to completion
    pub fn run(&mut self, request: &DeployRequest) -> Outcome {
        tracing::info!(
            job = %request.job_name,
            image = %request.image,
            tag = %request.tag,
            wait_status = request.wait_status().unwrap_or(""),
            "starting deploy"
        );

        let result = self.execute(request);
        if let Err(e) = self.machine.transition(DeployState::Done) {
            tracing::warn!(error = %e, "deploy already finished");
        }

        match &result {
            Ok(_) => tracing::info!(job = %request.job_name, "deploy finished"),
            Err(failure) => tracing::error!(
                job = %request.job_name,
                kind = ?failure.kind,
                message = %failure.message,
                "deploy failed"
            ),
        }
        result.into()
    }

    fn execute(&mut self, request: &DeployRequest) -> Result<DeploySuccess, DeployFailure> {
        let spec = match self.client.get_job(&request.job_name, &request.related_service)? {
            JobLookup::Found(spec) => {
                tracing::info!(job = %request.job_name, source = "control-plane", "job fetched");
                spec
            }
            JobLookup::Recovered(spec) => {
                tracing::info!(job = %request.job_name, source = "job-file", "job fetched");
                spec
            }
            JobLookup::Missing { reason } => {
                return Err(DeployFailure::new(
                    FailureKind::JobNotFound,
                    format!("job {} not found: {}", request.job_name, reason),
                ));
            }
        };
        self.machine.transition(DeployState::SpecFetched)?;

        let spec = apply_image_tag_with(spec, &request.image, &request.tag, &request.version_env);
        let spec = apply_deploy_metadata(spec, request.user.as_deref(), request.branch.as_deref());
        tracing::debug!(
            task_groups = spec.task_group_count(),
            tasks = spec.task_count(),
            "job updated"
        );
        self.machine.transition(DeployState::SpecMutated)?;

        let response = self.client.submit_job(&spec)?;
        self.machine.transition(DeployState::Submitted)?;
        tracing::info!(evaluation = %response.eval_id, "job submitted");

        let Some(wait_status) = request.wait_status() else {
            return Ok(DeploySuccess::Submitted { response });
        };

        let evaluation = self.wait_for_evaluation(&response)?;

        self.machine.transition(DeployState::AllocationsPending)?;
        let allocations = self.watched_allocations(&evaluation.id, request.task_group())?;
        if allocations.is_empty() {
            return Err(DeployFailure::nothing_run());
        }

        let mut settled = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            self.wait_for_allocation(&allocation.id, wait_status)?;
            settled.push(allocation.id.clone());
        }
        self.machine.transition(DeployState::AllocationsSettled)?;

        Ok(DeploySuccess::Settled {
            evaluation_id: evaluation.id,
            allocations: settled,
        })
    }

    fn wait_for_evaluation(&mut self, response: &SubmitJobResponse) -> Result<Evaluation, DeployFailure> {
        if response.eval_id.is_empty() {
            return Err(DeployFailure::new(
                FailureKind::ControlPlane,
                "submission created no evaluation to wait on",
            ));
        }
        self.machine.transition(DeployState::EvaluationPending)?;

        let strict = self.options.strict_evaluation;
        let outcome = poll_until(
            || {
                let eval = self.client.get_evaluation(&response.eval_id)?;
                tracing::debug!(evaluation = %eval.id, status = %eval.status, "evaluation polled");
                Ok::<_, ClientError>(eval)
            },
            |eval| eval.is_complete(),
            |eval| strict && eval.is_failed(),
            &self.options.evaluation_poll,
            &self.cancel,
        )?;

        match outcome {
            PollOutcome::Succeeded(eval) => {
                self.machine.transition(DeployState::EvaluationSettled)?;
                tracing::info!(evaluation = %eval.id, "evaluation complete");
                Ok(eval)
            }
            PollOutcome::Failed(eval) => Err(DeployFailure::new(
                FailureKind::EvaluationFailed,
                format!(
                    "evaluation {} {}{}",
                    eval.id,
                    eval.status,
                    eval.status_description
                        .as_deref()
                        .map(|d| format!(": {}", d))
                        .unwrap_or_default()
                ),
            )),
            PollOutcome::TimedOut { attempts, last } => Err(DeployFailure::new(
                FailureKind::TimedOut,
                format!(
                    "evaluation {} still {} after {} checks",
                    response.eval_id,
                    last.map(|e| e.status).unwrap_or_default(),
                    attempts
                ),
            )),
            PollOutcome::Cancelled { .. } => Err(DeployFailure::cancelled()),
        }
    }

    fn watched_allocations(
        &self,
        evaluation_id: &str,
        task_group: Option<&str>,
    ) -> Result<Vec<Allocation>, DeployFailure> {
        let allocations = self.client.get_allocations_for_evaluation(evaluation_id)?;
        let total = allocations.len();

        let watched: Vec<Allocation> = allocations
            .into_iter()
            .filter(|a| task_group.map_or(true, |g| a.task_group == g))
            .collect();

        tracing::info!(
            evaluation = evaluation_id,
            total,
            watched = watched.len(),
            task_group = task_group.unwrap_or(""),
            "allocations placed"
        );
        Ok(watched)
    }

    fn wait_for_allocation(&self, allocation_id: &str, wait_status: &str) -> Result<(), DeployFailure> {
        let outcome = poll_until(
            || {
                let alloc = self.client.get_allocation(allocation_id)?;
                tracing::debug!(allocation = %alloc.id, status = %alloc.client_status, "allocation polled");
                Ok::<_, ClientError>(alloc)
            },
            |alloc| alloc.client_status == wait_status,
            |alloc| alloc.client_status == client_status::FAILED,
            &self.options.allocation_poll,
            &self.cancel,
        );

        match outcome {
            Ok(PollOutcome::Succeeded(alloc)) => {
                tracing::info!(allocation = %alloc.id, status = %alloc.client_status, "allocation settled");
                Ok(())
            }
            Ok(PollOutcome::Failed(alloc)) => {
                tracing::warn!(allocation = %alloc.id, "allocation failed, collecting task logs");
                Err(self.allocation_failure(&alloc))
            }
            Ok(PollOutcome::TimedOut { attempts, last }) => Err(DeployFailure::new(
                FailureKind::TimedOut,
                format!(
                    "allocation {} still {} after {} checks",
                    allocation_id,
                    last.map(|a| a.client_status).unwrap_or_default(),
                    attempts
                ),
            )
            .with_allocation(allocation_id)),
            Ok(PollOutcome::Cancelled { .. }) => Err(DeployFailure::cancelled().with_allocation(allocation_id)),
            Err(e) => Err(DeployFailure::new(
                FailureKind::ControlPlane,
                format!("could not read allocation {}", allocation_id),
            )
            .with_allocation(allocation_id)
            .with_diagnostics(Diagnostics::Opaque(e.to_string()))),
        }
    }

    fn allocation_failure(&self, alloc: &Allocation) -> DeployFailure {
        let tasks: BTreeMap<String, TaskLogs> = alloc
            .task_names()
            .into_iter()
            .map(|task| {
                let logs = TaskLogs {
                    stdout: self.client.get_fs_log(&alloc.id, &task, LogStream::Stdout),
                    stderr: self.client.get_fs_log(&alloc.id, &task, LogStream::Stderr),
                };
                (task, logs)
            })
            .collect();

        let mut message = format!("allocation {} failed", alloc.id);
        if let Some(description) = alloc.client_description.as_deref().filter(|d| !d.is_empty()) {
            message.push_str(": ");
            message.push_str(description);
        }

        DeployFailure::new(FailureKind::AllocationFailed, message)
            .with_allocation(alloc.id.clone())
            .with_diagnostics(Diagnostics::Tasks(tasks))
    }
}

//! Human-readable deploy report

use std::fmt::Write as _;

use crate::deploy::{DeployFailure, DeploySuccess, Diagnostics, Outcome};

const RULE: &str = "------------------------";

/// Render the lines printed once a deploy ends
pub fn render(job_name: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Ok(success) => render_success(job_name, success),
        Outcome::Error(failure) => render_failure(job_name, failure),
    }
}

fn render_success(job_name: &str, success: &DeploySuccess) -> String {
    match success {
        DeploySuccess::Submitted { response } => format!(
            "Submitted '{}' job (evaluation {})\n",
            job_name, response.eval_id
        ),
        DeploySuccess::Settled { allocations, .. } => format!(
            "Completed '{}' job! ({} allocation{})\n",
            job_name,
            allocations.len(),
            if allocations.len() == 1 { "" } else { "s" }
        ),
    }
}

/// Failure header followed by diagnostics.
///
/// Task logs print stderr before stdout, each under its own rule.
pub fn render_failure(job_name: &str, failure: &DeployFailure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Error trying to execute '{}' job", job_name);
    let _ = writeln!(out, "{}: {}", failure.kind.description(), failure.message);

    match &failure.diagnostics {
        Diagnostics::None => {}
        Diagnostics::Opaque(payload) => {
            let _ = writeln!(out, "{}", payload);
        }
        Diagnostics::Tasks(tasks) => {
            for (task, logs) in tasks {
                let _ = writeln!(out, "{} Output:", task);
                for (label, text) in [("STDERR", &logs.stderr), ("STDOUT", &logs.stdout)] {
                    let _ = writeln!(out, "{}", label);
                    let _ = writeln!(out, "{}", RULE);
                    let _ = writeln!(out, "{}", text.trim_end_matches('\n'));
                }
            }
        }
    }

    out
}

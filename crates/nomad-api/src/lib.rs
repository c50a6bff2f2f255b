//! Nomad API Types
//!
//! Wire types for the subset of the Nomad HTTP API used by deployments:
//! jobs, evaluations, allocations and client log frames.

pub mod allocation;
pub mod error;
pub mod evaluation;
pub mod job;
pub mod paths;
pub mod request;

pub use allocation::{Allocation, TaskState};
pub use error::JobSpecError;
pub use evaluation::Evaluation;
pub use job::JobSpec;
pub use request::{LogFrame, LogStream, ParseJobRequest, SubmitJobRequest, SubmitJobResponse};

/// Default HTTP port of the Nomad agent.
pub const DEFAULT_PORT: u16 = 4646;

/// Canonical in-cluster address of the Nomad servers.
pub const DEFAULT_ADDRESS: &str = "nomad.service.consul";

//! Mock Control Plane
//!
//! In-process fake of the Nomad endpoints and the gateway shell, used to
//! drive the client and the deploy orchestrator in tests.
//!
//! # Endpoints
//!
//! - `GET /v1/job/{name}`: registered jobs, 404 otherwise
//! - `POST /v1/jobs/parse`: parses job files added with `add_job_file`
//! - `POST /v1/job/{name}`: records the body, returns an evaluation ID
//! - `GET /v1/evaluation/{id}`: scripted status sequence
//! - `GET /v1/evaluation/{id}/allocations`: scripted allocation list
//! - `GET /v1/allocation/{id}`: scripted client status sequence
//! - `GET /v1/client/fs/logs/{id}`: scripted log frames
//!
//! Every request is recorded so tests can assert on what was (not) called.

mod failure;
mod nomad;

pub use failure::{FailureConfig, FailureInjector};
pub use nomad::{allocation, encode_log, MockNomad};

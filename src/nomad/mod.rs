//! Control-plane client
//!
//! Typed access to the Nomad HTTP endpoints a deploy needs, issued through
//! an [`HttpTransport`] (normally the SSH tunnel), plus the generic
//! [`poll_until`] loop used to wait on evaluations and allocations.

pub mod client;
pub mod poll;
pub mod transport;

pub use client::{ClientError, JobFileLocation, JobLookup, NomadClient};
pub use poll::{poll_until, PollOptions, PollOutcome};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};

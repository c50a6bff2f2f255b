//! Deploy reporting
//!
//! Human-readable output for the terminal and a JSON summary for CI.

mod deploy_summary;
mod report;

pub use deploy_summary::{DeploySummary, SUMMARY_SCHEMA_ID};
pub use report::{render, render_failure};

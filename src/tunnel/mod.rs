//! Tunnel provider
//!
//! Opens an SSH local forward from this host to the control plane through
//! an administrative gateway, and runs one-off commands on other hosts
//! reachable through the same gateway.
//!
//! The tunnel is scoped: [`with_tunnel`] (or dropping an [`SshTunnel`])
//! tears down the SSH process on every exit path, including panics.

mod ssh;

pub use ssh::{with_tunnel, SshConfig, SshTunnel};

use std::io;

/// Runs a single shell command on a named host behind the gateway
pub trait RemoteShell: Send + Sync {
    /// Execute `command` on `host` and return its stdout
    fn exec(&self, host: &str, command: &str) -> Result<String, TunnelError>;
}

/// Tunnel errors
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// Connection or authentication against the gateway failed
    #[error("Tunnel unavailable: {0}")]
    Unavailable(String),

    #[error("Tunnel not ready after {seconds}s")]
    ConnectionTimeout { seconds: u64 },

    #[error("Failed to spawn ssh: {0}")]
    Spawn(#[source] io::Error),

    #[error("Remote command on {host} exited with {status}: {stderr}")]
    RemoteCommand {
        host: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

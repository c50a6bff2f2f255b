//! OpenSSH-backed tunnel
//!
//! The forward runs as an `ssh -N -L` child process. Readiness is detected
//! by connecting to the local end of the forward; an early exit of the
//! child means the gateway refused the connection or the key.

use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::nomad::{JobFileLocation, NomadClient, ReqwestTransport};

use super::{RemoteShell, TunnelError};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// SSH tunnel configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// OpenSSH client binary
    pub program: String,
    /// Gateway (jump) host
    pub host: String,
    /// SSH user on the gateway and on hosts behind it
    pub user: String,
    /// SSH port (default 22)
    pub port: u16,
    /// Path to SSH private key
    pub key_path: String,
    /// Control-plane address as seen from the gateway
    pub remote_address: String,
    /// Control-plane port as seen from the gateway
    pub remote_port: u16,
    /// Connection and readiness timeout
    pub connect_timeout: Duration,
    /// Server alive interval for detecting dead connections
    pub server_alive_interval: u32,
    /// Server alive count max
    pub server_alive_count_max: u32,
    /// Local end of the forward; a free port is picked when unset
    pub local_port: Option<u16>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            host: String::new(),
            user: String::new(),
            port: 22,
            key_path: "/id_rsa".to_string(),
            remote_address: nomad_api::DEFAULT_ADDRESS.to_string(),
            remote_port: nomad_api::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(30),
            server_alive_interval: 15,
            server_alive_count_max: 2,
            local_port: None,
        }
    }
}

impl SshConfig {
    /// ssh runs in its own process group so a terminal interrupt reaches
    /// only us; the forward is torn down when the deploy unwinds.
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        #[cfg(unix)]
        command.process_group(0);
        command.stdin(Stdio::null());
        command
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.server_alive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.server_alive_count_max),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-i".to_string(),
            self.key_path.clone(),
        ]
    }

    /// Arguments for the long-lived forward process
    pub fn forward_args(&self, local_port: u16) -> Vec<String> {
        let mut args = vec!["-N".to_string()];
        args.extend(self.common_args());
        args.push("-o".to_string());
        args.push("ExitOnForwardFailure=yes".to_string());
        args.push("-p".to_string());
        args.push(self.port.to_string());
        args.push("-L".to_string());
        args.push(format!(
            "127.0.0.1:{}:{}:{}",
            local_port, self.remote_address, self.remote_port
        ));
        args.push(format!("{}@{}", self.user, self.host));
        args
    }

    /// Arguments for running `command` on `target` by way of the gateway
    pub fn exec_args(&self, target: &str, command: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push("-o".to_string());
        args.push(format!(
            "ProxyCommand={} -o BatchMode=yes -i {} -p {} -W %h:%p {}@{}",
            self.program, self.key_path, self.port, self.user, self.host
        ));
        args.push(format!("{}@{}", self.user, target));
        args.push(command.to_string());
        args
    }
}

/// An open tunnel to the control plane
///
/// Dropping the tunnel kills the forward.
pub struct SshTunnel {
    config: SshConfig,
    child: Child,
    local_port: u16,
    http: ReqwestTransport,
}

impl SshTunnel {
    /// Open the forward and wait until it accepts connections
    pub fn open(config: SshConfig) -> Result<Self, TunnelError> {
        let local_port = match config.local_port {
            Some(port) => port,
            None => free_local_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", local_port);
        let http = ReqwestTransport::new(base_url, config.connect_timeout)
            .map_err(|e| TunnelError::Unavailable(e.to_string()))?;

        let args = config.forward_args(local_port);
        tracing::debug!(program = %config.program, host = %config.host, local_port, "spawning ssh forward");
        let child = config
            .command()
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(TunnelError::Spawn)?;

        let mut tunnel = Self {
            config,
            child,
            local_port,
            http,
        };
        tunnel.wait_ready()?;

        tracing::info!(
            gateway = %tunnel.config.host,
            remote = %format!("{}:{}", tunnel.config.remote_address, tunnel.config.remote_port),
            local_port,
            pid = tunnel.pid(),
            "tunnel open"
        );
        Ok(tunnel)
    }

    fn wait_ready(&mut self) -> Result<(), TunnelError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.local_port));
        let start = Instant::now();

        loop {
            if let Some(status) = self.child.try_wait()? {
                let mut stderr = String::new();
                if let Some(ref mut pipe) = self.child.stderr {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                return Err(TunnelError::Unavailable(format!(
                    "ssh exited with {}: {}",
                    status,
                    stderr.trim()
                )));
            }

            if TcpStream::connect_timeout(&addr, READY_POLL_INTERVAL).is_ok() {
                return Ok(());
            }

            if start.elapsed() >= self.config.connect_timeout {
                return Err(TunnelError::ConnectionTimeout {
                    seconds: self.config.connect_timeout.as_secs(),
                });
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    /// Process id of the ssh forward
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// A control-plane client whose requests go through this tunnel
    pub fn client(&self, job_files: JobFileLocation) -> NomadClient<'_> {
        NomadClient::new(&self.http, self).with_job_files(job_files)
    }

    /// Close the tunnel now rather than at drop
    pub fn close(self) {}

    fn shutdown(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
        tracing::info!(gateway = %self.config.host, "tunnel closed");
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RemoteShell for SshTunnel {
    fn exec(&self, host: &str, command: &str) -> Result<String, TunnelError> {
        let args = self.config.exec_args(host, command);
        tracing::debug!(host, command, "remote exec");

        let output = self
            .config
            .command()
            .args(&args)
            .output()
            .map_err(TunnelError::Spawn)?;

        if !output.status.success() {
            return Err(TunnelError::RemoteCommand {
                host: host.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Open a tunnel, run `f` with it, and close it on every exit path
pub fn with_tunnel<R>(config: SshConfig, f: impl FnOnce(&SshTunnel) -> R) -> Result<R, TunnelError> {
    let tunnel = SshTunnel::open(config)?;
    let result = f(&tunnel);
    tunnel.close();
    Ok(result)
}

fn free_local_port() -> Result<u16, TunnelError> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SshConfig {
        SshConfig {
            host: "bastion.example.com".to_string(),
            user: "deploy".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_ssh_config_defaults() {
        let config = SshConfig::default();
        assert_eq!(config.port, 22);
        assert_eq!(config.key_path, "/id_rsa");
        assert_eq!(config.remote_address, "nomad.service.consul");
        assert_eq!(config.remote_port, 4646);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_forward_args() {
        let args = config().forward_args(50123);

        assert_eq!(args[0], "-N");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ExitOnForwardFailure=yes".to_string()));
        let l = args.iter().position(|a| a == "-L").unwrap();
        assert_eq!(args[l + 1], "127.0.0.1:50123:nomad.service.consul:4646");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/id_rsa");
        assert_eq!(args.last().unwrap(), "deploy@bastion.example.com");
    }

    #[test]
    fn test_exec_args_jump_through_gateway() {
        let args = config().exec_args("nomad.service.consul", "cat /etc/nomad/jobs.d/web.nomad");

        let proxy = args.iter().find(|a| a.starts_with("ProxyCommand=")).unwrap();
        assert!(proxy.contains("-W %h:%p deploy@bastion.example.com"));
        assert!(proxy.contains("-i /id_rsa"));
        assert_eq!(args[args.len() - 2], "deploy@nomad.service.consul");
        assert_eq!(args[args.len() - 1], "cat /etc/nomad/jobs.d/web.nomad");
    }

    #[test]
    fn test_free_local_port() {
        let port = free_local_port().unwrap();
        assert!(port > 0);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::tunnel::TunnelError;
        use std::cell::Cell;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::panic::{catch_unwind, AssertUnwindSafe};
        use std::path::Path;
        use tempfile::TempDir;

        /// Write an executable stand-in for ssh that runs `body`
        fn stub(dir: &TempDir, body: &str) -> SshConfig {
            let path = dir.path().join("ssh");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            SshConfig {
                program: path.to_string_lossy().into_owned(),
                connect_timeout: Duration::from_secs(1),
                ..config()
            }
        }

        fn pid_file(dir: &TempDir) -> String {
            dir.path().join("pid").to_string_lossy().into_owned()
        }

        fn read_pid(path: &str) -> u32 {
            fs::read_to_string(Path::new(path)).unwrap().trim().parse().unwrap()
        }

        fn alive(pid: u32) -> bool {
            Command::new("sh")
                .arg("-c")
                .arg(format!("kill -0 {} 2>/dev/null", pid))
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        }

        #[test]
        fn test_refused_gateway_is_unavailable() {
            let dir = TempDir::new().unwrap();
            let pids = pid_file(&dir);
            let config = stub(
                &dir,
                &format!("echo $$ > {}\necho 'Permission denied (publickey).' >&2\nexit 255", pids),
            );

            let err = SshTunnel::open(config).err().unwrap();

            match err {
                TunnelError::Unavailable(message) => {
                    assert!(message.contains("255"), "got {}", message);
                    assert!(message.contains("Permission denied (publickey)."), "got {}", message);
                }
                other => panic!("unexpected error: {:?}", other),
            }
            assert!(!alive(read_pid(&pids)));
        }

        #[test]
        fn test_forward_never_ready_times_out_and_is_reaped() {
            let dir = TempDir::new().unwrap();
            let pids = pid_file(&dir);
            let config = stub(&dir, &format!("echo $$ > {}\nexec sleep 30", pids));

            let err = SshTunnel::open(config).err().unwrap();

            assert!(matches!(err, TunnelError::ConnectionTimeout { seconds: 1 }), "got {:?}", err);
            assert!(!alive(read_pid(&pids)));
        }

        #[test]
        fn test_with_tunnel_closes_after_success() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let dir = TempDir::new().unwrap();
            let config = SshConfig {
                local_port: Some(listener.local_addr().unwrap().port()),
                ..stub(&dir, "exec sleep 30")
            };

            let pid = with_tunnel(config, |tunnel| {
                let pid = tunnel.pid();
                assert!(alive(pid));
                #[cfg(target_os = "linux")]
                {
                    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap();
                    let fields: Vec<&str> = stat.rsplit_once(')').unwrap().1.split_whitespace().collect();
                    assert_eq!(fields[2], pid.to_string(), "forward runs in its own process group");
                }
                pid
            })
            .unwrap();

            assert!(!alive(pid));
        }

        #[test]
        fn test_with_tunnel_closes_on_panic() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let dir = TempDir::new().unwrap();
            let config = SshConfig {
                local_port: Some(listener.local_addr().unwrap().port()),
                ..stub(&dir, "exec sleep 30")
            };
            let pid = Cell::new(0);

            let result: std::thread::Result<Result<(), TunnelError>> = catch_unwind(AssertUnwindSafe(|| {
                with_tunnel(config, |tunnel| {
                    pid.set(tunnel.pid());
                    panic!("deploy blew up");
                })
            }));

            assert!(result.is_err());
            assert_ne!(pid.get(), 0);
            assert!(!alive(pid.get()));
        }
    }
}

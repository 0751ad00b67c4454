// ABOUTME: Tunnel transport driving the system ssh client.
// ABOUTME: One `ssh -R` process carries both the reverse forward and the remote command.

use super::{RemoteExecutor, TunnelError, TunnelSpec};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// ssh reserves this status for its own failures.
const SSH_ERROR_STATUS: i32 = 255;

pub struct OpenSshExecutor {
    program: String,
    command_timeout: Duration,
}

impl OpenSshExecutor {
    pub fn new(command_timeout: Duration) -> Self {
        Self::with_program("ssh", command_timeout)
    }

    /// Use a different client binary.
    pub fn with_program(program: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            command_timeout,
        }
    }

    /// Arguments for one invocation, in order.
    pub fn args(&self, spec: &TunnelSpec) -> Result<Vec<String>, TunnelError> {
        let mut args = vec![
            "-R".to_string(),
            format!("{}:{}", spec.remote_bind_port, forward_target(spec.local)),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
        ];

        if let Some(options) = &spec.connection_options {
            let words = shell_words::split(options).map_err(|e| {
                TunnelError::Connection(format!("cannot parse SSH options {:?}: {}", options, e))
            })?;
            args.extend(words);
        }

        if let Some(port) = spec.remote_host.port() {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        args.push("--".to_string());
        args.push(spec.remote_host.destination());
        args.push(spec.remote_command.clone());
        Ok(args)
    }
}

fn forward_target(local: SocketAddr) -> String {
    match local {
        SocketAddr::V4(addr) => format!("{}:{}", addr.ip(), addr.port()),
        SocketAddr::V6(addr) => format!("[{}]:{}", addr.ip(), addr.port()),
    }
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    async fn run(&self, spec: &TunnelSpec) -> Result<(), TunnelError> {
        let args = self.args(spec)?;
        tracing::debug!(program = %self.program, ?args, "spawning ssh");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TunnelError::Connection(format!("cannot run {}: {}", self.program, e))
            })?;

        let waited = tokio::time::timeout(self.command_timeout, child.wait()).await;
        let status = match waited {
            Ok(status) => status.map_err(|e| {
                TunnelError::Connection(format!("waiting for {} failed: {}", self.program, e))
            })?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(TunnelError::Connection(format!(
                    "remote command timed out after {:?}",
                    self.command_timeout
                )));
            }
        };

        match status.code() {
            Some(0) => Ok(()),
            Some(SSH_ERROR_STATUS) => Err(TunnelError::Connection(format!(
                "{} exited with status {}",
                self.program, SSH_ERROR_STATUS
            ))),
            Some(exit_code) => Err(TunnelError::RemoteExecution { exit_code }),
            None => Err(TunnelError::Connection(format!(
                "{} terminated by signal",
                self.program
            ))),
        }
    }
}

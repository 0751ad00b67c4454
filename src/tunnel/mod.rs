// ABOUTME: Reverse tunnel plus remote command execution over SSH.
// ABOUTME: Transport selection, the tunnel description, and its error taxonomy.

mod native;
mod openssh;
mod script;

pub use native::NativeExecutor;
pub use openssh::OpenSshExecutor;
pub use script::RemoteScript;

use crate::types::HostSpec;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("SSH connection failed: {0}")]
    Connection(String),

    #[error("remote command exited with status {exit_code}")]
    RemoteExecution { exit_code: i32 },

    #[error("the {transport} transport cannot use pass-through SSH options ({options})")]
    UnsupportedOptions {
        transport: Transport,
        options: String,
    },
}

impl From<crate::ssh::Error> for TunnelError {
    fn from(e: crate::ssh::Error) -> Self {
        TunnelError::Connection(e.to_string())
    }
}

/// Everything one remote execution needs. Built per invocation, consumed once.
#[derive(Debug, Clone)]
pub struct TunnelSpec {
    /// Where the registry listens on this machine.
    pub local: SocketAddr,
    /// Port the remote host listens on; the remote script pulls from `localhost:<port>`.
    pub remote_bind_port: u16,
    pub remote_host: HostSpec,
    /// Opaque options handed to the transport.
    pub connection_options: Option<String>,
    /// Command line run on the remote host.
    pub remote_command: String,
}

impl TunnelSpec {
    pub fn local_port(&self) -> u16 {
        self.local.port()
    }
}

/// Runs a command on a remote host with the registry tunnelled to it.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, spec: &TunnelSpec) -> Result<(), TunnelError>;
}

/// Which SSH implementation carries the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// The system `ssh` client.
    #[default]
    Openssh,
    /// The built-in client.
    Native,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Openssh => write!(f, "openssh"),
            Transport::Native => write!(f, "native"),
        }
    }
}

/// SSH settings from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SshSettings {
    #[serde(default)]
    pub transport: Transport,
    /// Private key for the native transport.
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// known_hosts file for the native transport.
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            key: None,
            known_hosts: None,
            trust_first_connection: false,
            command_timeout: default_command_timeout(),
        }
    }
}

/// Pick the executor for `settings`, rejecting combinations it cannot honour.
pub fn executor_for(
    settings: &SshSettings,
    connection_options: Option<&str>,
) -> Result<Box<dyn RemoteExecutor>, TunnelError> {
    match settings.transport {
        Transport::Openssh => Ok(Box::new(OpenSshExecutor::new(settings.command_timeout))),
        Transport::Native => {
            if let Some(options) = connection_options {
                return Err(TunnelError::UnsupportedOptions {
                    transport: Transport::Native,
                    options: options.to_string(),
                });
            }
            Ok(Box::new(NativeExecutor::new(settings.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_rejects_pass_through_options() {
        let settings = SshSettings {
            transport: Transport::Native,
            ..Default::default()
        };
        assert!(matches!(
            executor_for(&settings, Some("-C")),
            Err(TunnelError::UnsupportedOptions { .. })
        ));
        assert!(executor_for(&settings, None).is_ok());
    }

    #[test]
    fn openssh_takes_pass_through_options() {
        assert!(executor_for(&SshSettings::default(), Some("-C -i key")).is_ok());
    }
}

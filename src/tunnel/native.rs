// ABOUTME: Tunnel transport using the built-in russh client.
// ABOUTME: Requests a remote listener, serves forwarded channels, and relays command output.

use super::{RemoteExecutor, SshSettings, TunnelError, TunnelSpec};
use crate::ssh::{Session, SessionConfig};
use async_trait::async_trait;

pub struct NativeExecutor {
    settings: SshSettings,
}

impl NativeExecutor {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    fn session_config(&self, spec: &TunnelSpec) -> Result<SessionConfig, TunnelError> {
        let target = &spec.remote_host;
        let user = match target.user() {
            Some(user) => user.to_string(),
            None => std::env::var("USER").map_err(|_| {
                TunnelError::Connection(format!(
                    "no user in {} and USER is not set",
                    target
                ))
            })?,
        };

        let mut config = SessionConfig::new(target.host(), user)
            .trust_on_first_use(self.settings.trust_first_connection)
            .command_timeout(self.settings.command_timeout);
        if let Some(port) = target.port() {
            config = config.port(port);
        }
        if let Some(key) = &self.settings.key {
            config = config.key_path(key);
        }
        if let Some(known_hosts) = &self.settings.known_hosts {
            config = config.known_hosts_path(known_hosts);
        }
        Ok(config)
    }
}

#[async_trait]
impl RemoteExecutor for NativeExecutor {
    async fn run(&self, spec: &TunnelSpec) -> Result<(), TunnelError> {
        let config = self.session_config(spec)?;
        tracing::debug!(host = %config.host, port = config.port, user = %config.user, "connecting");
        let session = Session::connect(config).await?;

        let forward = match session.reverse_forward(spec.remote_bind_port, spec.local).await {
            Ok(forward) => forward,
            Err(e) => {
                let _ = session.disconnect().await;
                return Err(e.into());
            }
        };

        tracing::debug!(remote_port = forward.remote_port(), "tunnel up");
        let result = session.exec_relayed(&spec.remote_command).await;

        if let Err(e) = forward.cancel().await {
            tracing::debug!("cancelling reverse forward failed: {}", e);
        }
        if let Err(e) = session.disconnect().await {
            tracing::debug!("disconnect failed: {}", e);
        }

        match result? {
            0 => Ok(()),
            code => Err(TunnelError::RemoteExecution {
                exit_code: i32::try_from(code).unwrap_or(i32::MAX),
            }),
        }
    }
}

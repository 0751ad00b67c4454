// ABOUTME: Ephemeral local registry lifecycle: launch, readiness, teardown.
// ABOUTME: One labelled registry container per invocation, published on loopback.

mod error;
mod probe;

pub use error::{RegistryError, RegistryErrorKind};
pub use probe::{HttpProbe, ProbeError, RegistryProbe};

use crate::retry::{RetryPolicy, wait_for};
use crate::runtime::{ContainerError, ContainerSpec, ImageRuntime, PortMapping};
use crate::types::{ContainerId, ImageRef};
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

/// Port the registry listens on inside its container.
const REGISTRY_CONTAINER_PORT: u16 = 5000;

/// Label marking containers this tool created.
pub const MANAGED_LABEL: &str = "haul.managed";

/// How the ephemeral registry is launched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_image")]
    pub image: ImageRef,
    /// Host port; 0 picks a free port at launch.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default)]
    pub readiness: RetryPolicy,
}

fn default_image() -> ImageRef {
    ImageRef::distribution_registry()
}

fn default_port() -> u16 {
    5000
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            image: default_image(),
            port: default_port(),
            bind: default_bind(),
            readiness: RetryPolicy::default(),
        }
    }
}

/// A running registry instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryHandle {
    container_id: ContainerId,
    host: String,
    port: u16,
    endpoint: SocketAddr,
}

impl RegistryHandle {
    pub fn new(container_id: ContainerId, host: impl Into<String>, endpoint: SocketAddr) -> Self {
        Self {
            container_id,
            host: host.into(),
            port: endpoint.port(),
            endpoint,
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the prefix of every transient image reference.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Socket the registry is published on locally.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }
}

/// Starts, probes, and stops the ephemeral registry.
///
/// The container name is fixed when the manager is built, so a launch that
/// never returned a handle can still be found and removed.
pub struct RegistryManager<'a> {
    runtime: &'a dyn ImageRuntime,
    probe: &'a dyn RegistryProbe,
    settings: RegistrySettings,
    name: String,
    launching: AtomicBool,
}

impl<'a> RegistryManager<'a> {
    pub fn new(
        runtime: &'a dyn ImageRuntime,
        probe: &'a dyn RegistryProbe,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            runtime,
            probe,
            settings,
            name: container_name(),
            launching: AtomicBool::new(false),
        }
    }

    /// Name given to the registry container.
    pub fn container_name(&self) -> &str {
        &self.name
    }

    /// Launch the registry container. Its image is pulled first if missing.
    pub async fn start(&self) -> Result<RegistryHandle, RegistryError> {
        let port = match self.settings.port {
            0 => pick_free_port(self.settings.bind).await?,
            port => port,
        };

        let spec = ContainerSpec {
            name: self.name.clone(),
            image: self.settings.image.clone(),
            labels: labels(),
            env: vec!["REGISTRY_STORAGE_DELETE_ENABLED=true".to_string()],
            ports: vec![PortMapping {
                host_ip: self.settings.bind.to_string(),
                host_port: port,
                container_port: REGISTRY_CONTAINER_PORT,
            }],
        };

        tracing::debug!(name = %spec.name, image = %spec.image, port, "launching registry");
        // Stays set if this future is dropped mid-launch.
        self.launching.store(true, Ordering::SeqCst);
        let launched = self.runtime.run_container(&spec).await;
        self.launching.store(false, Ordering::SeqCst);
        let container_id = launched.context(error::LaunchSnafu {
            image: self.settings.image.to_string(),
        })?;

        let endpoint = SocketAddr::new(connect_ip(self.settings.bind), port);
        Ok(RegistryHandle::new(container_id, "localhost", endpoint))
    }

    /// Poll the registry until it answers HTTP or the policy runs out.
    pub async fn wait_ready(
        &self,
        handle: &RegistryHandle,
        policy: &RetryPolicy,
    ) -> Result<(), RegistryError> {
        let endpoint = handle.endpoint();
        let status = wait_for(policy, || self.probe.probe(endpoint))
            .await
            .context(error::UnavailableSnafu {
                address: handle.address(),
                waited: policy.max_wait,
            })?;
        tracing::debug!(status, address = %handle.address(), "registry answered");
        Ok(())
    }

    /// Kill the registry if it is running, then remove it. Never fails.
    pub async fn stop(&self, handle: &RegistryHandle) {
        self.teardown(handle.container_id()).await;
    }

    /// Remove a container whose launch was cut short before a handle came back.
    ///
    /// Does nothing unless a launch was abandoned in flight.
    pub async fn stop_abandoned(&self) {
        if !self.launching.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(name = %self.name, "launch was cut short, removing by name");
        self.teardown(&ContainerId::new(self.name.clone())).await;
    }

    async fn teardown(&self, id: &ContainerId) {
        match self.runtime.is_running(id).await {
            Ok(true) => {
                if let Err(e) = self.runtime.kill_container(id).await {
                    tracing::warn!(container = %id.short(), "failed to kill registry: {}", e);
                }
            }
            Ok(false) => {
                tracing::debug!(container = %id.short(), "registry already stopped");
            }
            Err(ContainerError::NotFound(_)) => {
                tracing::debug!(container = %id.short(), "registry already gone");
                return;
            }
            Err(e) => {
                tracing::warn!(container = %id.short(), "cannot inspect registry: {}", e);
                return;
            }
        }

        if let Err(e) = self.runtime.remove_container(id).await {
            tracing::warn!(container = %id.short(), "failed to remove registry: {}", e);
        }
    }
}

/// An unspecified bind address is reached through loopback.
fn connect_ip(bind: IpAddr) -> IpAddr {
    match bind {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(std::net::Ipv6Addr::LOCALHOST),
        ip => ip,
    }
}

async fn pick_free_port(bind: IpAddr) -> Result<u16, RegistryError> {
    let listener = tokio::net::TcpListener::bind((bind, 0))
        .await
        .context(error::PortSelectionSnafu {
            bind: bind.to_string(),
        })?;
    let port = listener
        .local_addr()
        .context(error::PortSelectionSnafu {
            bind: bind.to_string(),
        })?
        .port();
    Ok(port)
}

fn container_name() -> String {
    format!(
        "haul-registry-{}-{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S%3f"),
        std::process::id()
    )
}

fn labels() -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(
        "haul.started".to_string(),
        chrono::Utc::now().to_rfc3339(),
    );
    labels.insert(
        "haul.host".to_string(),
        gethostname::gethostname().to_string_lossy().into_owned(),
    );
    labels
}

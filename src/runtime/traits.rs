// ABOUTME: Image runtime capability trait used by the registry manager and orchestrator.
// ABOUTME: Tag, push, pull, remove images; run, inspect, kill, remove containers.

use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use std::collections::HashMap;

/// The local image store and container engine.
///
/// Not sealed: tests substitute recording fakes for the real engine.
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Add `target` as another name for the local image `source`.
    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError>;

    /// Push a registry-qualified reference to its registry.
    async fn push_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Pull an image from its registry.
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Check if an image exists locally.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;

    /// Remove a reference. The image data survives while other tags point at it.
    async fn remove_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Create and start a container, pulling its image first if needed.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError>;

    /// Whether the container exists and is running.
    async fn is_running(&self, id: &ContainerId) -> Result<bool, ContainerError>;

    /// Send SIGKILL to a running container.
    async fn kill_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Remove a stopped container.
    async fn remove_container(&self, id: &ContainerId) -> Result<(), ContainerError>;
}

/// What to run.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Name for the container.
    pub name: String,
    /// Image to run.
    pub image: ImageRef,
    /// Labels to apply.
    pub labels: HashMap<String, String>,
    /// Environment as `KEY=value` pairs.
    pub env: Vec<String>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
}

/// A TCP port published from the container to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Host address to bind to.
    pub host_ip: String,
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("failed to tag {source_ref} as {target}: {reason}")]
    TagFailed {
        source_ref: String,
        target: String,
        reason: String,
    },

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("image in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("port already in use: {0}")]
    PortInUse(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("image not available: {0}")]
    ImageUnavailable(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

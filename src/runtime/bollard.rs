// ABOUTME: Bollard-based image runtime implementation.
// ABOUTME: Supports both Docker and Podman via Docker-compatible API.

use crate::runtime::traits::{ContainerError, ContainerSpec, ImageError, ImageRuntime};
use crate::runtime::types::{RuntimeInfo, RuntimeType};
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, KillContainerOptions,
    PushImageOptions, RemoveContainerOptions, RemoveImageOptions, StartContainerOptions,
    TagImageOptions,
};
use futures::StreamExt;
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use tokio::net::UnixStream;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_image_tag_error(e: bollard::errors::Error, source: &str, target: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(source.to_string())
        }
        _ => ImageError::TagFailed {
            source_ref: source.to_string(),
            target: target.to_string(),
            reason: e.to_string(),
        },
    }
}

fn map_image_push_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(image_name.to_string())
        }
        _ => ImageError::PushFailed(format!("{}: {}", image_name, e)),
    }
}

fn map_image_pull_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    ImageError::PullFailed(format!("{}: {}", image_name, e))
}

fn map_image_remove_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(image_name.to_string())
        }
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 409 =>
        {
            ImageError::InUse(image_name.to_string())
        }
        _ => ImageError::Runtime(format!("failed to remove {}: {}", image_name, e)),
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::ImageUnavailable(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::AlreadyExists(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError { message, .. }
            if is_port_conflict(message) =>
        {
            ContainerError::PortInUse(message.clone())
        }
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_kill_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

/// Docker and Podman word this differently; both end up as a 500.
fn is_port_conflict(message: &str) -> bool {
    message.contains("port is already allocated")
        || message.contains("address already in use")
        || message.contains("bind: address already in use")
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Image runtime implementation using bollard.
///
/// Supports both Docker and Podman via Docker-compatible API.
/// For Podman, pushes go through the native libpod API so TLS verification
/// can be disabled for the plain-HTTP loopback registry.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
    socket_path: Option<String>,
}

impl BollardRuntime {
    /// Create a new BollardRuntime with socket path for libpod API access.
    pub fn new_with_socket(client: Docker, runtime_type: RuntimeType, socket_path: String) -> Self {
        Self {
            client,
            runtime_type,
            socket_path: Some(socket_path),
        }
    }

    /// Connect to a container runtime using detected runtime info.
    pub fn connect(info: &RuntimeInfo) -> Result<Self, bollard::errors::Error> {
        let client =
            Docker::connect_with_unix(&info.socket_path, 120, bollard::API_DEFAULT_VERSION)?;
        Ok(Self::new_with_socket(
            client,
            info.runtime_type,
            info.socket_path.clone(),
        ))
    }

    /// Check the daemon answers before doing any work.
    pub async fn ping(&self) -> Result<(), bollard::errors::Error> {
        self.client.ping().await.map(|_| ())
    }

    /// Push using Podman's native libpod API with tlsVerify=false.
    async fn push_image_libpod(&self, image_name: &str) -> Result<(), ImageError> {
        let socket_path = self.socket_path.as_ref().ok_or_else(|| {
            ImageError::PushFailed("socket path not available for libpod API".to_string())
        })?;

        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ImageError::PushFailed(format!("failed to connect to socket: {}", e)))?;

        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ImageError::PushFailed(format!("HTTP handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!("libpod connection error: {}", e);
            }
        });

        let encoded_ref = urlencoding::encode(image_name);
        let uri = format!(
            "/v4.0.0/libpod/images/{}/push?destination={}&tlsVerify=false",
            encoded_ref, encoded_ref
        );

        let req = hyper::Request::builder()
            .method("POST")
            .uri(&uri)
            .header("Host", "localhost")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ImageError::PushFailed(format!("failed to build request: {}", e)))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ImageError::PushFailed(format!("request failed: {}", e)))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ImageError::PushFailed(format!("failed to read response: {}", e)))?
            .to_bytes();
        let body_text = String::from_utf8_lossy(&body);

        if status.as_u16() == 404 {
            return Err(ImageError::NotFound(image_name.to_string()));
        }
        if !status.is_success() {
            return Err(ImageError::PushFailed(format!(
                "{}: libpod API error: {}",
                image_name, body_text
            )));
        }

        // Progress is streamed as JSON lines; failures arrive in-band
        if body_text.contains("\"error\"") && !body_text.contains("\"error\":null") {
            return Err(ImageError::PushFailed(format!(
                "{}: {}",
                image_name, body_text
            )));
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: Vec<String> = Vec::new();
        for port in &spec.ports {
            let port_key = format!("{}/tcp", port.container_port);
            exposed_ports.push(port_key.clone());
            port_bindings.insert(
                port_key,
                Some(vec![PortBinding {
                    host_ip: Some(port.host_ip.clone()),
                    host_port: Some(port.host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            ..Default::default()
        };

        let container_config = ContainerCreateBody {
            image: Some(spec.image.to_string()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), container_config)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }
}

#[async_trait]
impl ImageRuntime for BollardRuntime {
    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError> {
        let opts = TagImageOptions {
            repo: Some(target.repository()),
            tag: Some(target.tag_or_latest().to_string()),
            ..Default::default()
        };

        self.client
            .tag_image(source.as_str(), Some(opts))
            .await
            .map_err(|e| map_image_tag_error(e, source.as_str(), target.as_str()))
    }

    async fn push_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();

        if self.runtime_type == RuntimeType::Podman && self.socket_path.is_some() {
            let full = format!("{}:{}", reference.repository(), reference.tag_or_latest());
            return self.push_image_libpod(&full).await;
        }

        let opts = PushImageOptions {
            tag: Some(reference.tag_or_latest().to_string()),
            ..Default::default()
        };

        // The daemon rejects pushes without an X-Registry-Auth header, even
        // for registries that need no credentials.
        let credentials = Some(DockerCredentials::default());

        // Push returns a stream of progress updates; errors are reported in-band
        let mut stream =
            self.client
                .push_image(&reference.repository(), Some(opts), credentials);
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| map_image_push_error(e, &image_name))?;
            if let Some(status) = info.status {
                tracing::debug!(image = %image_name, "{}", status);
            }
        }

        Ok(())
    }

    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = format!("{}:{}", reference.repository(), reference.tag_or_latest());

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| map_image_pull_error(e, &image_name))?;
        }

        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let image_name = reference.to_string();

        match self.client.inspect_image(&image_name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ImageError::Runtime(format!(
                "failed to inspect {}: {}",
                image_name, e
            ))),
        }
    }

    async fn remove_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();

        // No force: only this name is dropped, never the underlying image
        let opts = RemoveImageOptions {
            force: false,
            ..Default::default()
        };

        self.client
            .remove_image(&image_name, Some(opts), None)
            .await
            .map_err(|e| map_image_remove_error(e, &image_name))?;

        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let present = self
            .image_exists(&spec.image)
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;
        if !present {
            tracing::debug!(image = %spec.image, "image missing locally, pulling");
            self.pull_image(&spec.image)
                .await
                .map_err(|e| ContainerError::ImageUnavailable(e.to_string()))?;
        }

        let container_id = self.create_container(spec).await?;

        if let Err(e) = self
            .client
            .start_container(container_id.as_str(), None::<StartContainerOptions>)
            .await
        {
            // Clean up the created container on start failure
            let opts = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(remove_err) = self
                .client
                .remove_container(container_id.as_str(), Some(opts))
                .await
            {
                tracing::warn!(
                    "failed to remove container {} after start failure: {}",
                    container_id.short(),
                    remove_err
                );
            }
            return Err(map_container_start_error(e));
        }

        Ok(container_id)
    }

    async fn is_running(&self, id: &ContainerId) -> Result<bool, ContainerError> {
        match self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(details
                .state
                .and_then(|s| s.running)
                .unwrap_or(false)),
            Err(e) => Err(map_container_not_found_error(e)),
        }
    }

    async fn kill_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .kill_container(id.as_str(), None::<KillContainerOptions>)
            .await
            .map_err(map_container_kill_error)
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }
}

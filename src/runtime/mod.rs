// ABOUTME: Local image runtime access for Docker and Podman.
// ABOUTME: Auto-detects the socket, connects with bollard, and exposes the ImageRuntime trait.

mod bollard;
mod detection;
mod error;
mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::{ContainerError, ContainerSpec, ImageError, ImageRuntime, PortMapping};
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};

use snafu::ResultExt;

/// Detect the local runtime and connect to it, confirming the daemon answers.
pub async fn connect_local(config: &RuntimeConfig) -> Result<BollardRuntime, RuntimeError> {
    let info = detect_local(config)?;
    tracing::debug!(runtime = %info.runtime_type, socket = %info.socket_path, "using local runtime");

    let runtime = BollardRuntime::connect(&info).context(error::ConnectionSnafu {
        socket: info.socket_path.clone(),
    })?;
    runtime.ping().await.context(error::ConnectionSnafu {
        socket: info.socket_path.clone(),
    })?;
    Ok(runtime)
}

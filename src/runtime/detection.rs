// ABOUTME: Local container runtime detection.
// ABOUTME: Honours explicit config and DOCKER_HOST, then checks Podman and Docker sockets.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use std::path::Path;

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),

    #[error("unsupported DOCKER_HOST (only unix:// sockets are supported): {0}")]
    UnsupportedHost(String),
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Detect the container runtime on this machine.
///
/// Detection order:
/// 1. Explicit `runtime`/`socket` from configuration
/// 2. `DOCKER_HOST=unix://...`
/// 3. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 4. Rootful Podman socket (`/run/podman/podman.sock`)
/// 5. Docker socket (`/var/run/docker.sock`)
pub fn detect_local(config: &RuntimeConfig) -> Result<RuntimeInfo, DetectionError> {
    detect_with(config, std::env::var("DOCKER_HOST").ok(), get_uid(), |p| {
        Path::new(p).exists()
    })
}

fn detect_with(
    config: &RuntimeConfig,
    docker_host: Option<String>,
    uid: Option<String>,
    exists: impl Fn(&str) -> bool,
) -> Result<RuntimeInfo, DetectionError> {
    if let Some(socket) = &config.socket {
        if !exists(socket) {
            return Err(DetectionError::SocketMissing(socket.clone()));
        }
        let runtime_type = config.runtime.unwrap_or_else(|| guess_type(socket));
        return Ok(RuntimeInfo {
            runtime_type,
            socket_path: socket.clone(),
        });
    }

    if let Some(runtime_type) = config.runtime {
        let socket_path = match runtime_type {
            RuntimeType::Docker => DOCKER_SOCKET.to_string(),
            RuntimeType::Podman => uid
                .as_deref()
                .map(rootless_podman_socket)
                .filter(|s| exists(s))
                .unwrap_or_else(|| ROOTFUL_PODMAN.to_string()),
        };
        return Ok(RuntimeInfo {
            runtime_type,
            socket_path,
        });
    }

    if let Some(host) = docker_host.filter(|h| !h.is_empty()) {
        let socket = host
            .strip_prefix("unix://")
            .ok_or_else(|| DetectionError::UnsupportedHost(host.clone()))?;
        return Ok(RuntimeInfo {
            runtime_type: guess_type(socket),
            socket_path: socket.to_string(),
        });
    }

    if let Some(uid) = uid.as_deref() {
        let rootless_socket = rootless_podman_socket(uid);
        if exists(&rootless_socket) {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: rootless_socket,
            });
        }
    }

    if exists(ROOTFUL_PODMAN) {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    if exists(DOCKER_SOCKET) {
        return Ok(RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound)
}

fn rootless_podman_socket(uid: &str) -> String {
    format!("/run/user/{}/podman/podman.sock", uid)
}

fn guess_type(socket: &str) -> RuntimeType {
    if socket.contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        // Fall back to reading /proc/self/status
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(paths: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |p| paths.contains(&p)
    }

    #[test]
    fn rootless_podman_wins_over_docker() {
        let info = detect_with(
            &RuntimeConfig::default(),
            None,
            Some("1000".to_string()),
            only(&["/run/user/1000/podman/podman.sock", DOCKER_SOCKET]),
        )
        .unwrap();
        assert_eq!(info.runtime_type, RuntimeType::Podman);
        assert_eq!(info.socket_path, "/run/user/1000/podman/podman.sock");
    }

    #[test]
    fn falls_back_to_docker() {
        let info = detect_with(
            &RuntimeConfig::default(),
            None,
            Some("1000".to_string()),
            only(&[DOCKER_SOCKET]),
        )
        .unwrap();
        assert_eq!(info.runtime_type, RuntimeType::Docker);
    }

    #[test]
    fn docker_host_overrides_socket_probe() {
        let info = detect_with(
            &RuntimeConfig::default(),
            Some("unix:///tmp/custom.sock".to_string()),
            None,
            only(&[]),
        )
        .unwrap();
        assert_eq!(info.socket_path, "/tmp/custom.sock");
        assert_eq!(info.runtime_type, RuntimeType::Docker);

        let err = detect_with(
            &RuntimeConfig::default(),
            Some("tcp://10.0.0.1:2375".to_string()),
            None,
            only(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, DetectionError::UnsupportedHost(_)));
    }

    #[test]
    fn explicit_socket_must_exist() {
        let config = RuntimeConfig {
            runtime: None,
            socket: Some("/nope/podman.sock".to_string()),
        };
        let err = detect_with(&config, None, None, only(&[])).unwrap_err();
        assert!(matches!(err, DetectionError::SocketMissing(_)));
    }

    #[test]
    fn nothing_found() {
        let err = detect_with(&RuntimeConfig::default(), None, None, only(&[])).unwrap_err();
        assert!(matches!(err, DetectionError::NoRuntimeFound));
    }
}

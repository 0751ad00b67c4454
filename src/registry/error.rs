// ABOUTME: Registry manager error types with SNAFU pattern.
// ABOUTME: Distinguishes launch failures from readiness timeouts.

use snafu::Snafu;
use std::time::Duration;

use super::probe::ProbeError;
use crate::runtime::ContainerError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistryError {
    #[snafu(display("failed to launch registry {image}: {source}"))]
    Launch {
        image: String,
        source: ContainerError,
    },

    #[snafu(display("no free port on {bind}: {source}"))]
    PortSelection {
        bind: String,
        source: std::io::Error,
    },

    #[snafu(display("registry at {address} not ready after {waited:?}: {source}"))]
    Unavailable {
        address: String,
        waited: Duration,
        source: ProbeError,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// The instance could not be created or started.
    Launch,
    /// The instance started but never answered.
    Unavailable,
}

impl RegistryError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> RegistryErrorKind {
        match self {
            RegistryError::Launch { .. } | RegistryError::PortSelection { .. } => {
                RegistryErrorKind::Launch
            }
            RegistryError::Unavailable { .. } => RegistryErrorKind::Unavailable,
        }
    }
}

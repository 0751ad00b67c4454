// ABOUTME: Application-wide error types for haul.
// ABOUTME: One variant per failure class, each mapped to a process exit code.

use crate::cleanup::Interrupted;
use crate::registry::{RegistryError, RegistryErrorKind};
use crate::runtime::{ImageError, RuntimeError};
use crate::tunnel::TunnelError;
use crate::types::RequestError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for command-line flag errors.
pub const EXIT_FLAG: i32 = 125;
/// Exit status after SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Argument(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("local runtime unavailable: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("{0}")]
    Launch(RegistryError),

    #[error("{0}")]
    RegistryUnavailable(RegistryError),

    #[error("failed to tag {image}: {source}")]
    Tag { image: String, source: ImageError },

    #[error("failed to push {image}: {source}")]
    Push { image: String, source: ImageError },

    #[error("{0}")]
    Connection(String),

    #[error("remote transfer failed (exit status {exit_code})")]
    RemoteExecution { exit_code: i32 },

    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::RemoteExecution { exit_code } if (1..=255).contains(exit_code) => *exit_code,
            Error::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }

    /// Whether usage help should follow the message.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Argument(_))
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        match e.kind() {
            RegistryErrorKind::Launch => Error::Launch(e),
            RegistryErrorKind::Unavailable => Error::RegistryUnavailable(e),
        }
    }
}

impl From<TunnelError> for Error {
    fn from(e: TunnelError) -> Self {
        match e {
            TunnelError::Connection(reason) => Error::Connection(reason),
            TunnelError::RemoteExecution { exit_code } => Error::RemoteExecution { exit_code },
            e @ TunnelError::UnsupportedOptions { .. } => Error::Config(e.to_string()),
        }
    }
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Self {
        Error::Argument(e.to_string())
    }
}

impl From<Interrupted> for Error {
    fn from(_: Interrupted) -> Self {
        Error::Interrupted
    }
}

pub type Result<T> = std::result::Result<T, Error>;

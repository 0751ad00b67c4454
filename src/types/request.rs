// ABOUTME: The parsed, immutable description of one transfer invocation.
// ABOUTME: Validates the target and de-duplicates image references in order.

use super::host_spec::{HostSpec, HostSpecError};
use super::image_ref::{ImageRef, ParseImageRefError};
use nonempty::NonEmpty;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid host: {0}")]
    Host(#[from] HostSpecError),

    #[error("invalid image: {0}")]
    Image(#[from] ParseImageRefError),

    #[error("at least one image is required")]
    NoImages,
}

/// Where the images go, how to reach it, and which images to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    target: HostSpec,
    ssh_opts: Option<String>,
    images: NonEmpty<ImageRef>,
}

impl TransferRequest {
    /// Build a request from already-validated parts.
    ///
    /// Duplicate references (by literal text) are dropped, keeping the first
    /// occurrence, so each image is pushed and pulled exactly once.
    pub fn new(
        target: HostSpec,
        ssh_opts: Option<String>,
        images: impl IntoIterator<Item = ImageRef>,
    ) -> Result<Self, RequestError> {
        let mut unique: Vec<ImageRef> = Vec::new();
        for image in images {
            if unique.iter().any(|seen| seen.as_str() == image.as_str()) {
                tracing::warn!("ignoring duplicate image reference {}", image);
                continue;
            }
            unique.push(image);
        }

        let images = NonEmpty::from_vec(unique).ok_or(RequestError::NoImages)?;
        let ssh_opts = ssh_opts.filter(|opts| !opts.trim().is_empty());

        Ok(Self {
            target,
            ssh_opts,
            images,
        })
    }

    /// Parse raw command-line values.
    pub fn parse<S: AsRef<str>>(
        target: &str,
        images: &[S],
        ssh_opts: Option<String>,
    ) -> Result<Self, RequestError> {
        let target = HostSpec::parse(target)?;
        let images = images
            .iter()
            .map(|s| ImageRef::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(target, ssh_opts, images)
    }

    pub fn target(&self) -> &HostSpec {
        &self.target
    }

    /// Opaque connection options for the SSH transport.
    pub fn ssh_opts(&self) -> Option<&str> {
        self.ssh_opts.as_deref()
    }

    pub fn images(&self) -> &NonEmpty<ImageRef> {
        &self.images
    }
}

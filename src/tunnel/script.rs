// ABOUTME: Builds the remote pull/retag/cleanup command for one transfer.
// ABOUTME: Per-image chains run best-effort; the script exits with the aggregate status.

use crate::runtime::RuntimeType;
use crate::types::ImageRef;

/// The command executed on the remote host while the tunnel is up.
#[derive(Debug, Clone)]
pub struct RemoteScript {
    runtime: RuntimeType,
    registry_address: String,
    images: Vec<ImageRef>,
}

impl RemoteScript {
    /// `registry_address` is the `host:port` the remote side reaches through the tunnel.
    pub fn new<'a>(
        runtime: RuntimeType,
        registry_address: impl Into<String>,
        images: impl IntoIterator<Item = &'a ImageRef>,
    ) -> Self {
        Self {
            runtime,
            registry_address: registry_address.into(),
            images: images.into_iter().cloned().collect(),
        }
    }

    /// POSIX shell body: one pull && tag && rmi chain per image.
    pub fn body(&self) -> String {
        let cli = self.runtime.cli();
        let pull = match self.runtime {
            RuntimeType::Docker => format!("{} pull", cli),
            RuntimeType::Podman => format!("{} pull --tls-verify=false", cli),
        };

        let mut lines = vec!["status=0".to_string()];
        for image in &self.images {
            let transient = image.qualified(&self.registry_address);
            let transient = shell_words::quote(transient.as_str());
            let name = shell_words::quote(image.as_str());
            let message = format!("haul: failed to transfer {}", image);
            let failure = shell_words::quote(&message);
            lines.push(format!(
                "{pull} {transient} && {cli} tag {transient} {name} && {cli} rmi {transient} || {{ echo {failure} >&2; status=1; }}"
            ));
        }
        lines.push("exit $status".to_string());
        lines.join("\n")
    }

    /// The body wrapped for `sh -c`, independent of the remote login shell.
    pub fn command(&self) -> String {
        format!("sh -c {}", shell_words::quote(&self.body()))
    }
}

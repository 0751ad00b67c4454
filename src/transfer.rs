// ABOUTME: Transfer orchestration: registry, per-image push, remote pull, teardown.
// ABOUTME: Local steps fail fast; the remote script is best-effort per image.

use crate::cleanup::CleanupGuard;
use crate::error::{Error, Result};
use crate::output::Output;
use crate::registry::{RegistryHandle, RegistryManager, RegistryProbe, RegistrySettings};
use crate::runtime::{ImageRuntime, RuntimeType};
use crate::tunnel::{RemoteExecutor, RemoteScript, TunnelSpec};
use crate::types::{ImageRef, TransferRequest};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

/// What a successful transfer did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReport {
    pub target: String,
    pub registry: String,
    pub images: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// Settings that shape one transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferSettings {
    pub registry: RegistrySettings,
    pub remote_runtime: RuntimeType,
}

/// Drives one invocation against injected collaborators.
pub struct Transfer<'a> {
    runtime: &'a dyn ImageRuntime,
    probe: &'a dyn RegistryProbe,
    executor: &'a dyn RemoteExecutor,
    settings: TransferSettings,
    output: &'a Output,
}

impl<'a> Transfer<'a> {
    pub fn new(
        runtime: &'a dyn ImageRuntime,
        probe: &'a dyn RegistryProbe,
        executor: &'a dyn RemoteExecutor,
        settings: TransferSettings,
        output: &'a Output,
    ) -> Self {
        Self {
            runtime,
            probe,
            executor,
            settings,
            output,
        }
    }

    pub async fn run(&self, request: &TransferRequest) -> Result<TransferReport> {
        self.run_until(request, std::future::pending()).await
    }

    /// Like [`Transfer::run`], abandoning the work when `interrupt` completes.
    ///
    /// The registry is torn down before this returns, whatever the outcome.
    pub async fn run_until<I>(
        &self,
        request: &TransferRequest,
        interrupt: I,
    ) -> Result<TransferReport>
    where
        I: Future<Output = ()>,
    {
        let started = Instant::now();
        let manager =
            RegistryManager::new(self.runtime, self.probe, self.settings.registry.clone());
        let guard = CleanupGuard::new();

        let (registry, images) = guard
            .scope(&manager, interrupt, self.steps(&manager, &guard, request))
            .await?;

        Ok(TransferReport {
            target: request.target().to_string(),
            registry,
            images,
            elapsed: started.elapsed(),
        })
    }

    async fn steps(
        &self,
        manager: &RegistryManager<'_>,
        guard: &CleanupGuard,
        request: &TransferRequest,
    ) -> Result<(String, Vec<String>)> {
        self.output.step("Starting registry");
        let handle = manager.start().await?;
        guard.register(handle.clone());
        self.output.progress(&format!(
            "registry {} on {}",
            handle.container_id().short(),
            handle.address()
        ));

        self.output.step("Waiting for registry");
        manager
            .wait_ready(&handle, &self.settings.registry.readiness)
            .await?;

        let mut pushed = Vec::with_capacity(request.images().len());
        for image in request.images().iter() {
            self.output.step(&format!("Pushing {}", image));
            self.push_one(&handle, image).await?;
            pushed.push(image.to_string());
        }

        self.output.step(&format!("Pulling on {}", request.target()));
        for image in request.images().iter() {
            self.output.progress(&format!(
                "{} <- {}",
                image,
                image.qualified(&handle.address())
            ));
        }
        let script = RemoteScript::new(
            self.settings.remote_runtime,
            handle.address(),
            request.images().iter(),
        );
        let spec = TunnelSpec {
            local: handle.endpoint(),
            remote_bind_port: handle.port(),
            remote_host: request.target().clone(),
            connection_options: request.ssh_opts().map(String::from),
            remote_command: script.command(),
        };
        self.executor.run(&spec).await?;

        Ok((handle.address(), pushed))
    }

    /// Tag, push, and untag one image through the registry.
    async fn push_one(&self, handle: &RegistryHandle, image: &ImageRef) -> Result<()> {
        let transient = image.qualified(&handle.address());

        self.runtime
            .tag_image(image, &transient)
            .await
            .map_err(|source| Error::Tag {
                image: image.to_string(),
                source,
            })?;

        if let Err(source) = self.runtime.push_image(&transient).await {
            if let Err(e) = self.runtime.remove_image(&transient).await {
                tracing::warn!("failed to remove transient tag {}: {}", transient, e);
            }
            return Err(Error::Push {
                image: image.to_string(),
                source,
            });
        }

        self.runtime
            .remove_image(&transient)
            .await
            .map_err(|source| Error::Tag {
                image: transient.to_string(),
                source,
            })
    }
}

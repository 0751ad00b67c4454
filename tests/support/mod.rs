// ABOUTME: Test support utilities.
// ABOUTME: Recording fakes for the image runtime, registry probe, and remote executor.

use async_trait::async_trait;
use haul::registry::{ProbeError, RegistryProbe};
use haul::runtime::{ContainerError, ContainerSpec, ImageError, ImageRuntime};
use haul::tunnel::{RemoteExecutor, TunnelError, TunnelSpec};
use haul::types::{ContainerId, ImageRef};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("haul=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// One call made against [`FakeRuntime`].
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Tag(String, String),
    Push(String),
    Pull(String),
    Exists(String),
    RemoveImage(String),
    Run(String),
    IsRunning(String),
    Kill(String),
    RemoveContainer(String),
}

/// In-memory image runtime that records every call.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<Call>>,
    failing_pushes: Mutex<HashSet<String>>,
    run_failure: Mutex<Option<String>>,
    containers: Mutex<HashSet<String>>,
    running: Mutex<HashSet<String>>,
    names: Mutex<HashMap<String, String>>,
    launch_delay: Mutex<Option<Duration>>,
    launched: AtomicUsize,
    last_spec: Mutex<Option<ContainerSpec>>,
}

#[allow(dead_code)]
impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make pushes of `image` (by its untransformed reference) fail.
    pub fn fail_push_of(&self, image: &str) {
        self.failing_pushes.lock().insert(image.to_string());
    }

    /// Make container launches fail with a port conflict.
    pub fn fail_run(&self, message: &str) {
        *self.run_failure.lock() = Some(message.to_string());
    }

    /// Keep launches in flight for `delay` after the container is created.
    pub fn slow_launch(&self, delay: Duration) {
        *self.launch_delay.lock() = Some(delay);
    }

    /// Let a container exit on its own; it still exists afterwards.
    pub fn exit(&self, id: &str) {
        self.running.lock().remove(id);
    }

    /// Remove a container behind the orchestrator's back.
    pub fn vanish(&self, id: &str) {
        self.containers.lock().remove(id);
        self.running.lock().remove(id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Push(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Containers that still exist.
    pub fn live_containers(&self) -> usize {
        self.containers.lock().len()
    }

    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.last_spec.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    /// Containers can be addressed by id or by name, as with the real engines.
    fn resolve(&self, id: &ContainerId) -> String {
        self.names
            .lock()
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl ImageRuntime for FakeRuntime {
    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError> {
        self.record(Call::Tag(source.to_string(), target.to_string()));
        Ok(())
    }

    async fn push_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        self.record(Call::Push(reference.to_string()));
        let failing = self
            .failing_pushes
            .lock()
            .iter()
            .any(|image| reference.as_str().ends_with(&format!("/{}", image)));
        if failing {
            return Err(ImageError::PushFailed(format!("{}: denied", reference)));
        }
        Ok(())
    }

    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        self.record(Call::Pull(reference.to_string()));
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        self.record(Call::Exists(reference.to_string()));
        Ok(true)
    }

    async fn remove_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        self.record(Call::RemoveImage(reference.to_string()));
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        self.record(Call::Run(spec.image.to_string()));
        *self.last_spec.lock() = Some(spec.clone());
        if let Some(message) = self.run_failure.lock().clone() {
            return Err(ContainerError::PortInUse(message));
        }
        let n = self.launched.fetch_add(1, Ordering::SeqCst);
        let id = format!("registry{:02}", n);
        self.containers.lock().insert(id.clone());
        self.running.lock().insert(id.clone());
        self.names.lock().insert(spec.name.clone(), id.clone());
        let delay = *self.launch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ContainerId::new(id))
    }

    async fn is_running(&self, id: &ContainerId) -> Result<bool, ContainerError> {
        self.record(Call::IsRunning(id.to_string()));
        let id = self.resolve(id);
        if !self.containers.lock().contains(&id) {
            return Err(ContainerError::NotFound(id));
        }
        Ok(self.running.lock().contains(&id))
    }

    async fn kill_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.record(Call::Kill(id.to_string()));
        let id = self.resolve(id);
        if !self.running.lock().remove(&id) {
            return Err(ContainerError::NotRunning(id));
        }
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.record(Call::RemoveContainer(id.to_string()));
        let id = self.resolve(id);
        self.running.lock().remove(&id);
        if !self.containers.lock().remove(&id) {
            return Err(ContainerError::NotFound(id));
        }
        Ok(())
    }
}

/// Probe that refuses a fixed number of times, then answers.
#[allow(dead_code)]
pub struct FakeProbe {
    refusals: Option<usize>,
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProbe {
    pub fn ready() -> Self {
        Self::ready_after(0)
    }

    pub fn ready_after(refusals: usize) -> Self {
        Self {
            refusals: Some(refusals),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn never_ready() -> Self {
        Self {
            refusals: None,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryProbe for FakeProbe {
    async fn probe(&self, addr: SocketAddr) -> Result<u16, ProbeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.refusals {
            Some(refusals) if attempt >= refusals => Ok(401),
            _ => Err(ProbeError::Connect {
                addr,
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("refused (attempt {})", attempt + 1),
                ),
            }),
        }
    }
}

/// What [`FakeExecutor`] does when run.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    Exit(i32),
    Refused(String),
    Hang,
}

/// Remote executor that records each tunnel it was asked to open.
#[allow(dead_code)]
pub struct FakeExecutor {
    outcome: Outcome,
    specs: Mutex<Vec<TunnelSpec>>,
}

#[allow(dead_code)]
impl FakeExecutor {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn specs(&self) -> Vec<TunnelSpec> {
        self.specs.lock().clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn run(&self, spec: &TunnelSpec) -> Result<(), TunnelError> {
        self.specs.lock().push(spec.clone());
        match &self.outcome {
            Outcome::Success => Ok(()),
            Outcome::Exit(exit_code) => Err(TunnelError::RemoteExecution {
                exit_code: *exit_code,
            }),
            Outcome::Refused(reason) => Err(TunnelError::Connection(reason.clone())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

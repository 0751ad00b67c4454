// ABOUTME: Finalizer that tears down the ephemeral registry on every exit path.
// ABOUTME: Register once, finalize at most once, and race the work against interruption.

use crate::registry::{RegistryHandle, RegistryManager};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// The work was cut short by an external signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Holds the registry registration for one invocation.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    handle: Mutex<Option<RegistryHandle>>,
    finalized: AtomicBool,
}

impl CleanupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the registry to tear down. A later registration replaces an earlier one.
    pub fn register(&self, handle: RegistryHandle) {
        if let Some(previous) = self.handle.lock().replace(handle) {
            tracing::warn!(
                container = %previous.container_id().short(),
                "replacing registry registration"
            );
        }
    }

    pub fn registered(&self) -> Option<RegistryHandle> {
        self.handle.lock().clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Stop the registered registry, or one whose launch was interrupted.
    /// Only the first call does anything.
    pub async fn finalize(&self, manager: &RegistryManager<'_>) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => {
                tracing::debug!(container = %handle.container_id().short(), "tearing down registry");
                manager.stop(&handle).await;
            }
            None => manager.stop_abandoned().await,
        }
    }

    /// Run `body` until it completes or `interrupt` fires, then finalize.
    ///
    /// Finalization happens before this returns on both paths.
    pub async fn scope<T, E, I, F>(
        &self,
        manager: &RegistryManager<'_>,
        interrupt: I,
        body: F,
    ) -> Result<T, E>
    where
        I: Future<Output = ()>,
        F: Future<Output = Result<T, E>>,
        E: From<Interrupted>,
    {
        let outcome = tokio::select! {
            result = body => result,
            () = interrupt => {
                tracing::warn!("interrupted, cleaning up");
                Err(E::from(Interrupted))
            }
        };
        self.finalize(manager).await;
        outcome
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            tracing::warn!(
                container = %handle.container_id(),
                "registry container was never torn down"
            );
        }
    }
}

// ABOUTME: Integration tests for the cleanup guard.
// ABOUTME: At-most-once finalization and scoped acquisition under interruption.

mod support;

use haul::cleanup::{CleanupGuard, Interrupted};
use haul::registry::{RegistryManager, RegistrySettings};
use support::{Call, FakeProbe, FakeRuntime};

#[derive(Debug, PartialEq)]
enum TestError {
    Interrupted,
    Failed(String),
}

impl From<Interrupted> for TestError {
    fn from(_: Interrupted) -> Self {
        TestError::Interrupted
    }
}

/// Test: finalize with nothing registered.
/// Expected: no runtime calls.
#[tokio::test]
async fn finalize_without_registration_is_noop() {
    let runtime = FakeRuntime::new();
    let probe = FakeProbe::ready();
    let manager = RegistryManager::new(&runtime, &probe, RegistrySettings::default());
    let guard = CleanupGuard::new();

    guard.finalize(&manager).await;

    assert!(runtime.calls().is_empty());
    assert!(guard.is_finalized());
}

/// Test: finalize called repeatedly.
/// Expected: the registry is stopped once and the registration is cleared.
#[tokio::test]
async fn finalize_runs_once() {
    let runtime = FakeRuntime::new();
    let probe = FakeProbe::ready();
    let manager = RegistryManager::new(&runtime, &probe, RegistrySettings::default());
    let guard = CleanupGuard::new();
    guard.register(manager.start().await.unwrap());

    guard.finalize(&manager).await;
    guard.finalize(&manager).await;

    assert!(guard.registered().is_none());
    assert_eq!(runtime.count(|c| matches!(c, Call::IsRunning(_))), 1);
    assert_eq!(runtime.live_containers(), 0);
}

/// Test: the body fails after registering.
/// Expected: the body's error comes back and the registry is gone.
#[tokio::test]
async fn scope_finalizes_after_error() {
    let runtime = FakeRuntime::new();
    let probe = FakeProbe::ready();
    let manager = RegistryManager::new(&runtime, &probe, RegistrySettings::default());
    let guard = CleanupGuard::new();

    let result: Result<(), TestError> = guard
        .scope(&manager, std::future::pending(), async {
            let handle = manager
                .start()
                .await
                .map_err(|e| TestError::Failed(e.to_string()))?;
            guard.register(handle);
            Err(TestError::Failed("push failed".to_string()))
        })
        .await;

    assert_eq!(result, Err(TestError::Failed("push failed".to_string())));
    assert!(guard.is_finalized());
    assert_eq!(runtime.live_containers(), 0);
}

/// Test: the interrupt fires while the body is stuck.
/// Expected: Interrupted, with the registry torn down before scope returns.
#[tokio::test]
async fn scope_finalizes_on_interrupt() {
    let runtime = FakeRuntime::new();
    let probe = FakeProbe::ready();
    let manager = RegistryManager::new(&runtime, &probe, RegistrySettings::default());
    let guard = CleanupGuard::new();
    guard.register(manager.start().await.unwrap());

    let result: Result<(), TestError> = guard
        .scope(&manager, async {}, std::future::pending())
        .await;

    assert_eq!(result, Err(TestError::Interrupted));
    assert_eq!(runtime.live_containers(), 0);
}

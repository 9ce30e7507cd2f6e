//! Readiness gate
//!
//! Tracks whether the selected engine finished its asynchronous open. The
//! engine's `on_ready` future is wrapped once in a shared driver: a tokio task
//! polls it when a runtime is available, and every waiter polls the same
//! driver, so readiness also progresses on executors that are not tokio.
//! Whoever polls the driver to completion opens the gate for everyone.

use futures::future::{BoxFuture, FutureExt, Shared};
use keystash_core::AsyncStorageEngine;
use std::sync::Arc;

/// `NotReady` until the engine's ready hook resolves, then `Ready` for good.
///
/// The gate is open exactly when the shared driver has completed.
#[derive(Clone)]
pub struct ReadinessGate {
    driver: Option<Shared<BoxFuture<'static, ()>>>,
}

impl ReadinessGate {
    /// A gate that is already open
    pub fn ready() -> Self {
        Self { driver: None }
    }

    /// Gate on `engine`'s ready hook, if it declares one
    pub fn for_engine(engine: Arc<dyn AsyncStorageEngine>) -> Self {
        if !engine.has_ready_hook() {
            return Self::ready();
        }

        let driver = async move {
            engine.on_ready().await;
            tracing::debug!(engine = engine.kind(), "engine ready");
        }
        .boxed()
        .shared();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(driver.clone());
        }

        Self {
            driver: Some(driver),
        }
    }

    /// Whether the gate has opened
    pub fn is_ready(&self) -> bool {
        self.driver
            .as_ref()
            .map_or(true, |driver| driver.peek().is_some())
    }

    /// Resolve once the gate is open; no timeout
    pub async fn wait(&self) {
        if let Some(driver) = &self.driver {
            driver.clone().await;
        }
    }
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystash_testkit::GatedEngine;
    use std::time::Duration;

    #[tokio::test]
    async fn engine_without_hook_is_ready_immediately() {
        let engine = Arc::new(keystash_testkit::RawEngine::new());
        let gate = ReadinessGate::for_engine(engine);
        assert!(gate.is_ready());
        gate.wait().await;
    }

    #[tokio::test]
    async fn waiters_before_and_after_the_signal_resolve() {
        let (engine, trigger) = GatedEngine::new();
        let gate = ReadinessGate::for_engine(Arc::new(engine));
        assert!(!gate.is_ready());

        let early = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait().await }
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), gate.wait())
            .await
            .is_err());

        trigger.release();
        early.await.unwrap();
        gate.wait().await;
        assert!(gate.is_ready());
    }

    #[test]
    fn waiter_drives_readiness_without_a_runtime() {
        let (engine, trigger) = GatedEngine::new();
        let gate = ReadinessGate::for_engine(Arc::new(engine));
        trigger.release();
        futures::executor::block_on(gate.wait());
        assert!(gate.is_ready());
    }

    #[test]
    fn gate_stays_closed_until_the_driver_completes() {
        let (engine, trigger) = GatedEngine::new();
        let gate = ReadinessGate::for_engine(Arc::new(engine));
        let other = gate.clone();

        // polling while the hook is pending leaves every clone closed
        assert!(futures::executor::block_on(async {
            futures::poll!(std::pin::pin!(gate.wait())).is_pending()
        }));
        assert!(!other.is_ready());

        trigger.release();
        futures::executor::block_on(gate.wait());
        assert!(other.is_ready());
    }
}

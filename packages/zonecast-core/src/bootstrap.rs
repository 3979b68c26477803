//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! engine's services are instantiated and wired together. The backend and the
//! lifecycle are injected, so the standalone server, embedders and tests all
//! share the same wiring.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionContext, ActionFactory};
use crate::api::AppState;
use crate::backend::Backend;
use crate::lifecycle::Lifecycle;
use crate::pipeline::ExecutionPipeline;
use crate::queue::ActionQueue;
use crate::state::Config;
use crate::sync::SessionRegistry;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid action configuration: {0}")]
    InvalidConfig(String),
}

/// Container for all bootstrapped services.
///
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Device-control backend shared by every action.
    pub backend: Arc<dyn Backend>,
    /// Client session bookkeeping for long-polls.
    pub sessions: Arc<SessionRegistry>,
    /// Resolves request paths into actions.
    pub factory: Arc<ActionFactory>,
    /// Validates and executes actions.
    pub pipeline: Arc<ExecutionPipeline>,
    /// Serializes stackable actions.
    pub queue: Arc<ActionQueue>,
    /// Process-level reactions (fatal errors).
    pub lifecycle: Arc<dyn Lifecycle>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state from the wired services.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState::builder()
            .factory(Arc::clone(&self.factory))
            .pipeline(Arc::clone(&self.pipeline))
            .queue(Arc::clone(&self.queue))
            .lifecycle(Arc::clone(&self.lifecycle))
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Stops background work.
    ///
    /// The queue worker finishes the action in flight; actions still waiting
    /// in the queue are dropped.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        let pending = self.queue.len();
        self.cancel_token.cancel();
        self.queue.stop().await;
        if pending > 0 {
            log::info!("[Bootstrap] Queue stopped with {} pending request(s)", pending);
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps the engine around an existing backend.
///
/// Services are created in dependency order:
///
/// 1. Session registry and action context (depend on the backend)
/// 2. Execution pipeline (depends on the context)
/// 3. Action factory (depends on the timing defaults)
/// 4. Action queue worker (depends on the pipeline and the lifecycle)
///
/// Must be called from within a tokio runtime, since the queue worker is
/// spawned immediately.
///
/// # Errors
///
/// Returns an error if the action timing defaults are invalid.
pub fn bootstrap_services(
    config: Config,
    backend: Arc<dyn Backend>,
    lifecycle: Arc<dyn Lifecycle>,
) -> Result<BootstrappedServices, BootstrapError> {
    config
        .actions
        .validate()
        .map_err(BootstrapError::InvalidConfig)?;

    let cancel_token = CancellationToken::new();
    let sessions = Arc::new(SessionRegistry::new());
    let ctx = ActionContext::new(Arc::clone(&backend), Arc::clone(&sessions));
    let pipeline = Arc::new(ExecutionPipeline::new(ctx));
    let factory = Arc::new(ActionFactory::new(config.actions.clone()));
    let queue = Arc::new(ActionQueue::start(
        Arc::clone(&pipeline),
        Arc::clone(&lifecycle),
        cancel_token.child_token(),
    ));

    log::info!(
        "[Bootstrap] Engine ready (poll interval {}ms, execution timeout {}ms)",
        config.actions.poll_interval_ms,
        config.actions.execution_timeout_ms
    );

    Ok(BootstrappedServices {
        backend,
        sessions,
        factory,
        pipeline,
        queue,
        lifecycle,
        config: Arc::new(RwLock::new(config)),
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionState;
    use crate::backend::{FleetSpec, VirtualFleet};
    use crate::lifecycle::NoopLifecycle;
    use crate::state::ActionDefaults;
    use std::time::Duration;

    fn fleet() -> Arc<dyn Backend> {
        Arc::new(VirtualFleet::new(FleetSpec::demo(), Duration::ZERO).unwrap())
    }

    #[tokio::test]
    async fn rejects_zero_poll_interval() {
        let config = Config {
            actions: ActionDefaults {
                poll_interval_ms: 0,
                ..ActionDefaults::default()
            },
            ..Config::default()
        };
        let result = bootstrap_services(config, fleet(), Arc::new(NoopLifecycle));
        assert!(matches!(result, Err(BootstrapError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn factory_uses_configured_defaults() {
        let config = Config {
            actions: ActionDefaults {
                execution_timeout_ms: 1234,
                ..ActionDefaults::default()
            },
            ..Config::default()
        };
        let services = bootstrap_services(config, fleet(), Arc::new(NoopLifecycle)).unwrap();
        let action = services
            .factory
            .create_from_path("/zonecast/controller/play", None)
            .unwrap();
        assert_eq!(action.base().execution_timeout(), Duration::from_millis(1234));
        assert_eq!(action.base().state(), ActionState::Created);
        services.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_queue() {
        let services =
            bootstrap_services(Config::default(), fleet(), Arc::new(NoopLifecycle)).unwrap();
        services.shutdown().await;

        let action = services
            .factory
            .create_from_path("/zonecast/controller/play", None)
            .unwrap();
        assert!(services.queue.enqueue(action).is_err());
    }
}

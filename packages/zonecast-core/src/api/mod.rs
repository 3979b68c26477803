//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to the pipeline and the
//! queue. It provides the router construction and server startup functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::action::ActionFactory;
use crate::backend::ZoneTopology;
use crate::lifecycle::Lifecycle;
use crate::pipeline::ExecutionPipeline;
use crate::queue::ActionQueue;
use crate::state::Config;

pub mod http;
pub mod response;

/// Ports tried in order when no preferred port is configured.
const FALLBACK_PORT_RANGE: (u16, u16) = (8180, 8190);

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Resolves request paths into actions.
    pub factory: Arc<ActionFactory>,
    /// Validates and runs actions inline.
    pub pipeline: Arc<ExecutionPipeline>,
    /// Serializes stackable actions.
    pub queue: Arc<ActionQueue>,
    /// Receives fatal errors raised by inline actions.
    pub lifecycle: Arc<dyn Lifecycle>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    factory: Option<Arc<ActionFactory>>,
    pipeline: Option<Arc<ExecutionPipeline>>,
    queue: Option<Arc<ActionQueue>>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    config: Option<Arc<RwLock<Config>>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the action factory.
    pub fn factory(mut self, factory: Arc<ActionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the execution pipeline.
    pub fn pipeline(mut self, pipeline: Arc<ExecutionPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the action queue.
    pub fn queue(mut self, queue: Arc<ActionQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Sets the lifecycle.
    pub fn lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Arc<RwLock<Config>>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            factory: self.factory.expect("factory is required"),
            pipeline: self.pipeline.expect("pipeline is required"),
            queue: self.queue.expect("queue is required"),
            lifecycle: self.lifecycle.expect("lifecycle is required"),
            config: self.config.unwrap_or_default(),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Whether the backend can take requests right now.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pipeline.context().backend.is_ready()
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured or auto-discovered port.
pub async fn bind(config: &RwLock<Config>) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    let preferred_port = config.read().preferred_port;
    if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, tokio::net::TcpListener::bind(&addr).await?))
    } else {
        find_available_port(FALLBACK_PORT_RANGE.0, FALLBACK_PORT_RANGE.1).await
    }
}

/// Serves the API until `shutdown` is cancelled.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let (port, listener) = bind(&state.config).await?;
    log::info!("[Server] Listening on http://0.0.0.0:{}", port);

    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    log::info!("[Server] Stopped accepting requests");
    Ok(())
}

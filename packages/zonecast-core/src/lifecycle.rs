//! Application lifecycle abstraction.
//!
//! This module provides a [`Lifecycle`] trait for process-level reactions to
//! what happens inside the engine. Different implementations handle these
//! appropriately for their environment (standalone server vs embedding
//! application vs tests).

use parking_lot::Mutex;

use crate::error::FatalError;
use crate::protocol_constants::CRASH_EXIT_CODE;

/// Trait for application lifecycle operations.
///
/// The HTTP layer and the queue worker never decide on their own how to die:
/// a fatal action error is handed to [`Lifecycle::crash`].
pub trait Lifecycle: Send + Sync {
    /// Reacts to a fatal action error.
    ///
    /// The standalone server terminates the process without answering the
    /// request, so a supervisor can observe the exit and restart it.
    fn crash(&self, error: &FatalError);
}

/// Server lifecycle implementation for standalone deployment.
pub struct ServerLifecycle;

impl Lifecycle for ServerLifecycle {
    fn crash(&self, error: &FatalError) {
        tracing::error!(
            "Fatal error, terminating with exit code {}: {}",
            CRASH_EXIT_CODE,
            error
        );
        log::logger().flush();
        std::process::exit(CRASH_EXIT_CODE);
    }
}

/// No-op lifecycle for embedded use.
///
/// Logs fatal errors and carries on. Useful when embedding the core library
/// in an application that manages its own lifecycle.
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {
    fn crash(&self, error: &FatalError) {
        tracing::error!("Fatal error (no-op lifecycle): {}", error);
    }
}

/// Lifecycle that records crash requests instead of acting on them.
#[derive(Default)]
pub struct RecordingLifecycle {
    crashes: Mutex<Vec<String>>,
}

impl RecordingLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of every crash requested so far.
    #[must_use]
    pub fn crashes(&self) -> Vec<String> {
        self.crashes.lock().clone()
    }
}

impl Lifecycle for RecordingLifecycle {
    fn crash(&self, error: &FatalError) {
        self.crashes.lock().push(error.to_string());
    }
}

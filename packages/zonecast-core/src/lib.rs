//! Zonecast Core - action engine for a multi-zone media-renderer fleet.
//!
//! This crate turns HTTP requests into typed actions, serializes state-changing
//! commands through a single queue, and bridges the eventually consistent
//! device backend with bounded polling and long-polling reads. It is used by
//! the standalone server and can be embedded with a different backend.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`action`]: Action kinds, option parsing, the factory and every behavior
//! - [`pipeline`]: Per-action validate/execute lifecycle and error classification
//! - [`queue`]: FIFO worker for stackable actions
//! - [`sync`]: Polling synchronizer, long-poll protocol, versions and sessions
//! - [`backend`]: Collaborator traits and the in-memory virtual fleet
//! - [`api`]: HTTP router, response shaping and server startup
//! - [`lifecycle`]: Process-level handling of fatal errors
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`Backend`](backend::Backend): Device-control capabilities consumed by actions
//! - [`ActionBehavior`](action::ActionBehavior): Kind-specific validation and execution
//! - [`Lifecycle`](lifecycle::Lifecycle): Reaction to fatal errors
//!
//! The virtual fleet and the server lifecycle are the defaults for the
//! standalone server.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod api;
pub mod backend;
pub mod bootstrap;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod protocol_constants;
pub mod queue;
pub mod state;
pub mod sync;

// Re-export commonly used types at the crate root
pub use action::{Action, ActionBehavior, ActionFactory, ActionKind, ActionOutput, ActionState};
pub use error::{ActionError, ActionResult, ErrorCode, FatalError};
pub use lifecycle::{Lifecycle, NoopLifecycle, RecordingLifecycle, ServerLifecycle};
pub use pipeline::{Completion, ExecutionPipeline};
pub use queue::{ActionQueue, QueueError};
pub use state::{ActionDefaults, Config};

// Re-export backend types
pub use backend::{Backend, BackendError, FleetSpec, VirtualFleet};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrapError, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError};

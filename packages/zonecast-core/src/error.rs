//! Centralized error types for the Zonecast core library.
//!
//! Errors are split along the propagation boundary of the execution pipeline:
//! - [`ActionError`] covers everything an action may fail with; all variants
//!   except [`ActionError::Fatal`] are absorbed by the pipeline and turned into
//!   response data.
//! - [`FatalError`] is what escapes the pipeline. It is a separate type so the
//!   HTTP layer and the queue worker cannot accidentally report it as data.

use thiserror::Error;

use crate::backend::BackendError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for logs and API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for BackendError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "backend_unavailable",
            Self::UnknownDevice(_) => "unknown_device",
            Self::Rejected(_) => "command_rejected",
            Self::Transport(_) => "transport_failed",
        }
    }
}

/// Failure raised while validating or executing an action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A required option is missing or has an invalid value.
    #[error("{0}")]
    Validation(String),

    /// An identifier could not be resolved to a room, zone or renderer.
    #[error("{0}")]
    NotFound(String),

    /// Recoverable fault inside the action's own execution logic.
    #[error("{0}")]
    Execution(String),

    /// The device-control backend refused or failed the command.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Application-crash class. Never absorbed by the pipeline.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl ActionError {
    /// Returns true for the fault class that must terminate the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl ErrorCode for ActionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Execution(_) => "execution_failed",
            Self::Backend(e) => e.code(),
            Self::Fatal(_) => "fatal",
        }
    }
}

/// Fatal fault that escaped the execution pipeline.
///
/// Carries the action's request signature so the crash log names the request
/// that triggered it.
#[derive(Debug, Error)]
#[error("{message} ({request})")]
pub struct FatalError {
    /// Description of the fault.
    pub message: String,
    /// Request signature of the action that raised it.
    pub request: String,
}

/// Convenient Result alias for action validation and execution.
pub type ActionResult<T> = Result<T, ActionError>;

//! Device-control backend collaborator.
//!
//! The engine never talks to devices itself. It consumes the capability traits
//! in [`traits`], which a real device-control stack (or the in-memory
//! [`VirtualFleet`]) implements with its own internal locking.
//!
//! # Module Structure
//!
//! - `types` - Observable state shapes (zones, renderers, media items)
//! - `traits` - Capability traits consumed by actions
//! - `virtual_fleet` - In-memory, eventually consistent fleet used by the
//!   standalone server and by tests

use thiserror::Error;

pub mod traits;
pub mod types;
pub mod virtual_fleet;

pub use traits::{
    Backend, MediaLibrary, RendererControl, RendererStateSource, UpdateIdSource, ZoneControl,
    ZoneTopology,
};
pub use types::{
    MediaItem, PlayMode, RendererState, RoomInfo, SeekTarget, SleepTimer, StandbyMode,
    TransportSnapshot, TransportState, ZoneConfig, ZoneInfo,
};
pub use virtual_fleet::{FleetSpec, RoomSpec, VirtualFleet, ZoneSpec};

/// Errors reported by the device-control backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend is not connected to the device network.
    #[error("Backend is not available")]
    Unavailable,

    /// The addressed room, zone or renderer does not exist.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The device refused the command.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// Communication with the device failed.
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Convenient Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

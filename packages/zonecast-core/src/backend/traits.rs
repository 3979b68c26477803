//! Trait abstractions for the device-control backend.
//!
//! Actions depend on these traits rather than a concrete implementation, so
//! the engine can be driven by a real device stack or by fakes in tests.
//!
//! Read accessors are synchronous: implementations answer from cached
//! in-process state, taking their own lock for the duration of the call only.
//! This is what lets the polling synchronizer re-acquire on every iteration
//! without ever holding a lock across a sleep. Mutations are asynchronous
//! because they travel to devices.

use async_trait::async_trait;

use super::types::{
    MediaItem, PlayMode, RendererState, SeekTarget, StandbyMode, ZoneConfig,
};
use super::BackendResult;
use crate::sync::ResourceKey;

/// Topology lookups: rooms, zones and their renderers.
pub trait ZoneTopology: Send + Sync {
    /// Whether the backend is connected and its caches are populated.
    fn is_ready(&self) -> bool;

    /// Version string of the backend implementation.
    fn backend_version(&self) -> String;

    /// Resolves a human-readable room name to its UDN.
    fn room_udn_for_name(&self, name: &str) -> Option<String>;

    /// Returns true if a room with this UDN exists.
    fn room_exists(&self, room_udn: &str) -> bool;

    /// Returns the zone the room currently belongs to, if any.
    fn zone_udn_for_room(&self, room_udn: &str) -> Option<String>;

    /// Returns true if a zone with this UDN exists.
    fn zone_exists(&self, zone_udn: &str) -> bool;

    /// Returns the physical renderer of a room.
    fn renderer_udn_for_room(&self, room_udn: &str) -> Option<String>;

    /// Returns the virtual renderer of a zone.
    fn renderer_udn_for_zone(&self, zone_udn: &str) -> Option<String>;

    /// Lists all zone UDNs.
    fn zone_udns(&self) -> Vec<String>;

    /// Returns a snapshot of the whole topology.
    fn zone_config(&self) -> ZoneConfig;
}

/// Zone topology mutations.
#[async_trait]
pub trait ZoneControl: Send + Sync {
    /// Connects rooms to a zone, creating a new zone when `zone_udn` is `None`.
    ///
    /// Rooms leave their previous zone. The call returns once the command is
    /// accepted; the topology converges later.
    async fn connect_rooms_to_zone(
        &self,
        zone_udn: Option<&str>,
        room_udns: &[String],
    ) -> BackendResult<()>;

    /// Removes a room from whatever zone it belongs to.
    async fn drop_room(&self, room_udn: &str) -> BackendResult<()>;
}

/// Cached renderer state.
pub trait RendererStateSource: Send + Sync {
    /// Lists every known renderer UDN, physical and virtual.
    fn renderer_udns(&self) -> Vec<String>;

    /// Returns a snapshot of one renderer.
    fn renderer_state(&self, renderer_udn: &str) -> Option<RendererState>;
}

/// Renderer commands.
#[async_trait]
pub trait RendererControl: Send + Sync {
    async fn play(&self, renderer_udn: &str) -> BackendResult<()>;
    async fn pause(&self, renderer_udn: &str) -> BackendResult<()>;
    async fn stop(&self, renderer_udn: &str) -> BackendResult<()>;
    async fn next(&self, renderer_udn: &str) -> BackendResult<()>;
    async fn previous(&self, renderer_udn: &str) -> BackendResult<()>;

    /// Sets the volume (0-100, larger values are clamped).
    async fn set_volume(&self, renderer_udn: &str, volume: u8) -> BackendResult<()>;

    async fn set_mute(&self, renderer_udn: &str, mute: bool) -> BackendResult<()>;

    async fn set_play_mode(&self, renderer_udn: &str, mode: PlayMode) -> BackendResult<()>;

    async fn seek(&self, renderer_udn: &str, target: SeekTarget) -> BackendResult<()>;

    /// Jumps to a zero-based track index of the renderer's queue.
    async fn seek_to_track(&self, renderer_udn: &str, track_number: u32) -> BackendResult<()>;

    /// Replaces the queue with a container's items and starts playback.
    async fn load_container(
        &self,
        renderer_udn: &str,
        container_id: &str,
        track_number: Option<u32>,
    ) -> BackendResult<()>;

    /// Replaces the queue with a stored playlist and starts playback.
    async fn load_playlist(
        &self,
        renderer_udn: &str,
        playlist: &str,
        track_number: Option<u32>,
    ) -> BackendResult<()>;

    /// Plays a single URI.
    async fn load_uri(&self, renderer_udn: &str, uri: &str) -> BackendResult<()>;

    /// Loads a container in shuffle mode.
    async fn load_shuffle(&self, renderer_udn: &str, container_id: &str) -> BackendResult<()>;

    /// Arms (or with `seconds_until_sleep == 0` cancels) the sleep timer.
    async fn set_sleep_timer(
        &self,
        renderer_udn: &str,
        seconds_until_sleep: u32,
        seconds_for_volume_ramp: u32,
    ) -> BackendResult<()>;

    async fn enter_standby(&self, renderer_udn: &str, mode: StandbyMode) -> BackendResult<()>;

    async fn leave_standby(&self, renderer_udn: &str) -> BackendResult<()>;
}

/// Media lists and zone queues.
pub trait MediaLibrary: Send + Sync {
    /// Returns the items of a container, playlist-backed list or zone queue.
    fn media_list(&self, list_id: &str) -> Option<Vec<MediaItem>>;

    /// Returns the list id of a zone's play queue.
    fn zone_queue_id(&self, zone_udn: &str) -> Option<String>;
}

/// Per-resource version counters maintained by the backend.
pub trait UpdateIdSource: Send + Sync {
    /// Current version of a watchable resource (0 if it never changed).
    fn update_id(&self, resource: &ResourceKey) -> u64;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Trait (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Combined trait for all backend capabilities.
///
/// Used by the pipeline and `AppState` to hand a single handle to every action.
pub trait Backend:
    ZoneTopology
    + ZoneControl
    + RendererStateSource
    + RendererControl
    + MediaLibrary
    + UpdateIdSource
{
}

/// Blanket implementation for any type implementing all traits.
impl<T> Backend for T where
    T: ZoneTopology
        + ZoneControl
        + RendererStateSource
        + RendererControl
        + MediaLibrary
        + UpdateIdSource
{
}

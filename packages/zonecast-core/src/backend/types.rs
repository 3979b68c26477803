//! Observable state shapes exposed by the backend.
//!
//! These are snapshots: the backend hands out owned copies so callers never
//! hold a backend lock while serializing or comparing them.

use serde::{Deserialize, Serialize};

/// UPnP transport state of a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    PausedPlayback,
    Transitioning,
    NoMediaPresent,
}

/// Queue play mode of a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayMode {
    #[default]
    Normal,
    Shuffle,
    RepeatOne,
    RepeatAll,
    Random,
    #[serde(rename = "DIRECT_1")]
    Direct1,
}

impl PlayMode {
    /// Parses a play mode name case-insensitively (`repeat_all`, `REPEAT_ALL`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Some(Self::Normal),
            "SHUFFLE" => Some(Self::Shuffle),
            "REPEAT_ONE" => Some(Self::RepeatOne),
            "REPEAT_ALL" => Some(Self::RepeatAll),
            "RANDOM" => Some(Self::Random),
            "DIRECT_1" => Some(Self::Direct1),
            _ => None,
        }
    }
}

/// Standby flavour for room renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StandbyMode {
    /// Device wakes on activity.
    Automatic,
    /// Device stays off until explicitly woken.
    Manual,
}

/// Seek position for `SEEK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Absolute position in seconds.
    Absolute(u64),
    /// Offset from the current position in seconds.
    Relative(i64),
}

/// A playable or browsable media entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default = "default_item_class")]
    pub class: String,
}

fn default_item_class() -> String {
    "object.item.audioItem.musicTrack".to_string()
}

impl MediaItem {
    /// Builds a bare item for a directly loaded URI.
    pub fn from_uri(uri: &str) -> Self {
        Self {
            id: uri.to_string(),
            title: uri.to_string(),
            artist: None,
            album: None,
            uri: Some(uri.to_string()),
            class: "object.item.audioItem".to_string(),
        }
    }
}

/// Pending sleep timer on a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepTimer {
    pub seconds_until_sleep: u32,
    pub seconds_for_volume_ramp: u32,
}

/// Full renderer state as cached by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererState {
    pub udn: String,
    pub name: String,
    /// True for a zone's virtual (grouped) renderer.
    #[serde(rename = "isVirtual")]
    pub virtual_renderer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_udn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_udn: Option<String>,
    pub transport_state: TransportState,
    pub play_mode: PlayMode,
    pub volume: u8,
    pub mute: bool,
    pub track_number: u32,
    pub position_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_track: Option<MediaItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standby: Option<StandbyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_timer: Option<SleepTimer>,
}

impl RendererState {
    /// Creates an idle renderer state.
    pub fn idle(udn: impl Into<String>, name: impl Into<String>, virtual_renderer: bool) -> Self {
        Self {
            udn: udn.into(),
            name: name.into(),
            virtual_renderer,
            room_udn: None,
            zone_udn: None,
            transport_state: TransportState::NoMediaPresent,
            play_mode: PlayMode::Normal,
            volume: 30,
            mute: false,
            track_number: 0,
            position_secs: 0,
            current_track: None,
            standby: None,
            sleep_timer: None,
        }
    }

    /// Returns the transport-only projection used by `GETRENDERERTRANSPORTSTATE`.
    #[must_use]
    pub fn transport_snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            udn: self.udn.clone(),
            name: self.name.clone(),
            transport_state: self.transport_state,
            play_mode: self.play_mode,
            track_number: self.track_number,
            position_secs: self.position_secs,
        }
    }
}

/// Transport-only view of a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub udn: String,
    pub name: String,
    pub transport_state: TransportState,
    pub play_mode: PlayMode,
    pub track_number: u32,
    pub position_secs: u64,
}

/// A room and its renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub udn: String,
    pub name: String,
    pub renderer_udn: String,
}

/// A zone with its virtual renderer and member rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    pub udn: String,
    pub name: String,
    pub renderer_udn: String,
    pub rooms: Vec<RoomInfo>,
}

/// Complete zone topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ZoneConfig {
    pub zones: Vec<ZoneInfo>,
    pub unassigned_rooms: Vec<RoomInfo>,
}

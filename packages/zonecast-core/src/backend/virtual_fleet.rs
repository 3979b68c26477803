//! In-memory device fleet.
//!
//! Behaves like a real device network from the engine's point of view: commands
//! are accepted immediately but only become observable after a settle delay,
//! and every observable change bumps the matching resource version. The
//! standalone server runs on it, and tests use it to exercise convergence
//! waits and long-polling without hardware.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use super::traits::{
    MediaLibrary, RendererControl, RendererStateSource, UpdateIdSource, ZoneControl, ZoneTopology,
};
use super::types::{
    MediaItem, PlayMode, RendererState, RoomInfo, SeekTarget, SleepTimer, StandbyMode,
    TransportState, ZoneConfig, ZoneInfo,
};
use super::{BackendError, BackendResult};
use crate::sync::{ResourceKey, UpdateIdRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Fleet Description
// ─────────────────────────────────────────────────────────────────────────────

/// A room of the fleet description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSpec {
    pub name: String,
    /// Defaults to `uuid:room-<slug>`.
    #[serde(default)]
    pub udn: Option<String>,
    /// Defaults to `uuid:renderer-<slug>`.
    #[serde(default)]
    pub renderer_udn: Option<String>,
}

/// An initial zone, listing member rooms by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    #[serde(default)]
    pub udn: Option<String>,
    pub rooms: Vec<String>,
}

/// Declarative description of a fleet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSpec {
    #[serde(default)]
    pub rooms: Vec<RoomSpec>,
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
    /// Browsable containers keyed by container id.
    #[serde(default)]
    pub containers: HashMap<String, Vec<MediaItem>>,
    /// Stored playlists keyed by name.
    #[serde(default)]
    pub playlists: HashMap<String, Vec<MediaItem>>,
}

impl FleetSpec {
    /// A small four-room household used when no fleet file is configured.
    pub fn demo() -> Self {
        let room = |name: &str| RoomSpec {
            name: name.to_string(),
            udn: None,
            renderer_udn: None,
        };
        let track = |id: &str, title: &str, artist: &str| MediaItem {
            id: id.to_string(),
            title: title.to_string(),
            artist: Some(artist.to_string()),
            album: None,
            uri: Some(format!("http://media.local/{}.flac", id)),
            class: "object.item.audioItem.musicTrack".to_string(),
        };

        let mut containers = HashMap::new();
        containers.insert(
            "0/Albums/1".to_string(),
            vec![
                track("a1t1", "Opening", "The Examples"),
                track("a1t2", "Interlude", "The Examples"),
                track("a1t3", "Finale", "The Examples"),
            ],
        );
        let mut playlists = HashMap::new();
        playlists.insert(
            "Evening".to_string(),
            vec![
                track("p1t1", "Dusk", "Quiet Hours"),
                track("p1t2", "Night", "Quiet Hours"),
            ],
        );

        Self {
            rooms: vec![
                room("Kitchen"),
                room("Living Room"),
                room("Office"),
                room("Bedroom"),
            ],
            zones: vec![
                ZoneSpec {
                    udn: None,
                    rooms: vec!["Kitchen".to_string(), "Living Room".to_string()],
                },
                ZoneSpec {
                    udn: None,
                    rooms: vec!["Office".to_string()],
                },
            ],
            containers,
            playlists,
        }
    }
}

fn slug(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

fn virtual_renderer_udn(zone_udn: &str) -> String {
    format!("{}-vr", zone_udn)
}

fn queue_id(renderer_udn: &str) -> String {
    format!("queue:{}", renderer_udn)
}

// ─────────────────────────────────────────────────────────────────────────────
// Fleet State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Room {
    udn: String,
    name: String,
    renderer_udn: String,
}

#[derive(Debug, Clone)]
struct Zone {
    renderer_udn: String,
    rooms: Vec<String>,
}

#[derive(Debug, Default)]
struct FleetState {
    rooms: BTreeMap<String, Room>,
    zones: BTreeMap<String, Zone>,
    renderers: HashMap<String, RendererState>,
    containers: HashMap<String, Vec<MediaItem>>,
    playlists: HashMap<String, Vec<MediaItem>>,
    queues: HashMap<String, Vec<MediaItem>>,
}

impl FleetState {
    fn from_spec(spec: FleetSpec) -> BackendResult<Self> {
        let mut state = Self {
            containers: spec.containers,
            playlists: spec.playlists,
            ..Default::default()
        };

        for room in spec.rooms {
            let slug = slug(&room.name);
            let udn = room.udn.unwrap_or_else(|| format!("uuid:room-{}", slug));
            let renderer_udn = room
                .renderer_udn
                .unwrap_or_else(|| format!("uuid:renderer-{}", slug));

            let mut renderer = RendererState::idle(&renderer_udn, &room.name, false);
            renderer.room_udn = Some(udn.clone());
            state.renderers.insert(renderer_udn.clone(), renderer);
            state.rooms.insert(
                udn.clone(),
                Room {
                    udn,
                    name: room.name,
                    renderer_udn,
                },
            );
        }

        for (index, zone) in spec.zones.into_iter().enumerate() {
            let zone_udn = zone
                .udn
                .unwrap_or_else(|| format!("uuid:zone-{}", index + 1));
            let mut members = Vec::with_capacity(zone.rooms.len());
            for name in &zone.rooms {
                let room_udn = state
                    .room_udn_for_name(name)
                    .ok_or_else(|| BackendError::UnknownDevice(name.clone()))?;
                state.detach_room(&room_udn, None);
                members.push(room_udn);
            }
            state.create_zone(&zone_udn, members);
        }

        Ok(state)
    }

    fn room_udn_for_name(&self, name: &str) -> Option<String> {
        self.rooms
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name.trim()))
            .map(|r| r.udn.clone())
    }

    fn zone_udn_for_room(&self, room_udn: &str) -> Option<String> {
        self.zones
            .iter()
            .find(|(_, z)| z.rooms.iter().any(|r| r == room_udn))
            .map(|(udn, _)| udn.clone())
    }

    fn zone_name(&self, zone: &Zone) -> String {
        zone.rooms
            .iter()
            .filter_map(|udn| self.rooms.get(udn))
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn room_info(&self, room_udn: &str) -> Option<RoomInfo> {
        self.rooms.get(room_udn).map(|r| RoomInfo {
            udn: r.udn.clone(),
            name: r.name.clone(),
            renderer_udn: r.renderer_udn.clone(),
        })
    }

    fn create_zone(&mut self, zone_udn: &str, members: Vec<String>) -> Vec<ResourceKey> {
        let renderer_udn = virtual_renderer_udn(zone_udn);
        let mut renderer = RendererState::idle(&renderer_udn, "", true);
        renderer.zone_udn = Some(zone_udn.to_string());
        self.renderers.insert(renderer_udn.clone(), renderer);
        self.zones.insert(
            zone_udn.to_string(),
            Zone {
                renderer_udn: renderer_udn.clone(),
                rooms: Vec::new(),
            },
        );

        let mut changed = vec![ResourceKey::RendererState(Some(renderer_udn))];
        for room_udn in members {
            changed.extend(self.attach_room(zone_udn, &room_udn));
        }
        changed
    }

    /// Moves a room into `zone_udn`, which must exist.
    fn attach_room(&mut self, zone_udn: &str, room_udn: &str) -> Vec<ResourceKey> {
        let mut changed = Vec::new();
        if let Some(zone) = self.zones.get_mut(zone_udn) {
            if !zone.rooms.iter().any(|r| r == room_udn) {
                zone.rooms.push(room_udn.to_string());
            }
        }
        if let Some(room) = self.rooms.get(room_udn) {
            let renderer_udn = room.renderer_udn.clone();
            if let Some(renderer) = self.renderers.get_mut(&renderer_udn) {
                renderer.zone_udn = Some(zone_udn.to_string());
            }
            changed.push(ResourceKey::RendererState(Some(renderer_udn)));
        }
        changed.extend(self.rename_zone_renderer(zone_udn));
        changed
    }

    /// Removes a room from its zone. Zones left without rooms disappear unless
    /// they are `keep_zone`.
    fn detach_room(&mut self, room_udn: &str, keep_zone: Option<&str>) -> Vec<ResourceKey> {
        let Some(zone_udn) = self.zone_udn_for_room(room_udn) else {
            return Vec::new();
        };
        let mut changed = Vec::new();

        let now_empty = match self.zones.get_mut(&zone_udn) {
            Some(zone) => {
                zone.rooms.retain(|r| r != room_udn);
                zone.rooms.is_empty()
            }
            None => false,
        };

        if let Some(room) = self.rooms.get(room_udn) {
            let renderer_udn = room.renderer_udn.clone();
            if let Some(renderer) = self.renderers.get_mut(&renderer_udn) {
                renderer.zone_udn = None;
            }
            changed.push(ResourceKey::RendererState(Some(renderer_udn)));
        }

        if now_empty && keep_zone != Some(zone_udn.as_str()) {
            if let Some(zone) = self.zones.remove(&zone_udn) {
                self.renderers.remove(&zone.renderer_udn);
                self.queues.remove(&queue_id(&zone.renderer_udn));
                changed.push(ResourceKey::RendererState(Some(zone.renderer_udn)));
            }
        } else {
            changed.extend(self.rename_zone_renderer(&zone_udn));
        }
        changed
    }

    fn rename_zone_renderer(&mut self, zone_udn: &str) -> Vec<ResourceKey> {
        let Some(zone) = self.zones.get(zone_udn) else {
            return Vec::new();
        };
        let name = self.zone_name(zone);
        let renderer_udn = zone.renderer_udn.clone();
        match self.renderers.get_mut(&renderer_udn) {
            Some(renderer) if renderer.name != name => {
                renderer.name = name;
                vec![ResourceKey::RendererState(Some(renderer_udn))]
            }
            _ => Vec::new(),
        }
    }

    /// The renderer itself plus, for a zone's virtual renderer, its members.
    fn group_renderers(&self, renderer_udn: &str) -> Vec<String> {
        let mut udns = vec![renderer_udn.to_string()];
        if let Some(zone) = self.zones.values().find(|z| z.renderer_udn == renderer_udn) {
            udns.extend(
                zone.rooms
                    .iter()
                    .filter_map(|r| self.rooms.get(r))
                    .map(|r| r.renderer_udn.clone()),
            );
        }
        udns
    }

    /// Replaces a renderer's queue and starts playing `track_number`.
    fn load_queue(
        &mut self,
        renderer_udn: &str,
        items: Vec<MediaItem>,
        track_number: u32,
    ) -> Vec<ResourceKey> {
        let list_id = queue_id(renderer_udn);
        let current = items.get(track_number as usize).cloned();
        self.queues.insert(list_id.clone(), items);
        if let Some(renderer) = self.renderers.get_mut(renderer_udn) {
            renderer.track_number = track_number;
            renderer.position_secs = 0;
            renderer.current_track = current;
            renderer.transport_state = TransportState::Playing;
        }
        vec![
            ResourceKey::MediaList(list_id),
            ResourceKey::RendererState(Some(renderer_udn.to_string())),
        ]
    }

    fn queue_len(&self, renderer_udn: &str) -> usize {
        self.queues
            .get(&queue_id(renderer_udn))
            .map_or(0, Vec::len)
    }

    fn jump_to_track(&mut self, renderer_udn: &str, track_number: u32) -> Vec<ResourceKey> {
        let current = self
            .queues
            .get(&queue_id(renderer_udn))
            .and_then(|q| q.get(track_number as usize))
            .cloned();
        match (current, self.renderers.get_mut(renderer_udn)) {
            (Some(item), Some(renderer)) => {
                renderer.track_number = track_number;
                renderer.position_secs = 0;
                renderer.current_track = Some(item);
                vec![ResourceKey::RendererState(Some(renderer_udn.to_string()))]
            }
            _ => Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Virtual Fleet
// ─────────────────────────────────────────────────────────────────────────────

type Mutation = Box<dyn FnOnce(&mut FleetState) -> Vec<ResourceKey> + Send>;

struct FleetInner {
    state: RwLock<FleetState>,
    versions: UpdateIdRegistry,
    settle_delay: Duration,
    ready: AtomicBool,
    frozen: AtomicBool,
}

impl FleetInner {
    fn commit(&self, mutation: Mutation) {
        let changed = {
            let mut state = self.state.write();
            mutation(&mut state)
        };
        for key in &changed {
            self.versions.bump(key);
        }
        log::trace!("[Fleet] Committed change to {} resources", changed.len());
    }
}

/// Eventually consistent in-memory implementation of every backend trait.
///
/// Cheap to clone; clones share the same fleet.
#[derive(Clone)]
pub struct VirtualFleet {
    inner: Arc<FleetInner>,
}

impl VirtualFleet {
    /// Builds a fleet from its description.
    ///
    /// With a zero `settle_delay` commands take effect before they return,
    /// otherwise they are applied by a background task after the delay.
    pub fn new(spec: FleetSpec, settle_delay: Duration) -> BackendResult<Self> {
        let state = FleetState::from_spec(spec)?;
        log::info!(
            "[Fleet] Virtual fleet with {} rooms and {} zones (settle delay {:?})",
            state.rooms.len(),
            state.zones.len(),
            settle_delay
        );
        Ok(Self {
            inner: Arc::new(FleetInner {
                state: RwLock::new(state),
                versions: UpdateIdRegistry::new(),
                settle_delay,
                ready: AtomicBool::new(true),
                frozen: AtomicBool::new(false),
            }),
        })
    }

    /// Marks the fleet as (not) ready to receive requests.
    pub fn set_ready(&self, ready: bool) {
        self.inner.ready.store(ready, Ordering::SeqCst);
    }

    /// While frozen, accepted commands never become observable.
    pub fn set_frozen(&self, frozen: bool) {
        self.inner.frozen.store(frozen, Ordering::SeqCst);
    }

    /// Records an out-of-band change, as a device notification would.
    pub fn mark_changed(&self, key: &ResourceKey) -> u64 {
        self.inner.versions.bump(key)
    }

    fn ensure_ready(&self) -> BackendResult<()> {
        if self.inner.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable)
        }
    }

    fn ensure_renderer(&self, renderer_udn: &str) -> BackendResult<()> {
        self.ensure_ready()?;
        if self.inner.state.read().renderers.contains_key(renderer_udn) {
            Ok(())
        } else {
            Err(BackendError::UnknownDevice(renderer_udn.to_string()))
        }
    }

    fn ensure_room(&self, state: &FleetState, room_udn: &str) -> BackendResult<()> {
        if state.rooms.contains_key(room_udn) {
            Ok(())
        } else {
            Err(BackendError::UnknownDevice(room_udn.to_string()))
        }
    }

    fn schedule(&self, mutation: Mutation) {
        if self.inner.frozen.load(Ordering::SeqCst) {
            log::debug!("[Fleet] Frozen, command accepted but not applied");
            return;
        }

        let delay = self.inner.settle_delay;
        if delay.is_zero() {
            self.inner.commit(mutation);
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.commit(mutation);
        });
    }

    /// Applies `f` to one renderer.
    fn update_renderer<F>(&self, renderer_udn: &str, f: F) -> BackendResult<()>
    where
        F: FnOnce(&mut RendererState) + Send + 'static,
    {
        self.ensure_renderer(renderer_udn)?;
        let udn = renderer_udn.to_string();
        self.schedule(Box::new(move |state| match state.renderers.get_mut(&udn) {
            Some(renderer) => {
                f(renderer);
                vec![ResourceKey::RendererState(Some(udn))]
            }
            None => Vec::new(),
        }));
        Ok(())
    }

    /// Applies `f` to a renderer and, for a zone renderer, to its members.
    fn update_group<F>(&self, renderer_udn: &str, f: F) -> BackendResult<()>
    where
        F: Fn(&mut RendererState) + Send + 'static,
    {
        self.ensure_renderer(renderer_udn)?;
        let udn = renderer_udn.to_string();
        self.schedule(Box::new(move |state| {
            let mut changed = Vec::new();
            for member in state.group_renderers(&udn) {
                if let Some(renderer) = state.renderers.get_mut(&member) {
                    f(renderer);
                    changed.push(ResourceKey::RendererState(Some(member)));
                }
            }
            changed
        }));
        Ok(())
    }
}

impl ZoneTopology for VirtualFleet {
    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    fn backend_version(&self) -> String {
        format!("virtual-fleet/{}", env!("CARGO_PKG_VERSION"))
    }

    fn room_udn_for_name(&self, name: &str) -> Option<String> {
        self.inner.state.read().room_udn_for_name(name)
    }

    fn room_exists(&self, room_udn: &str) -> bool {
        self.inner.state.read().rooms.contains_key(room_udn)
    }

    fn zone_udn_for_room(&self, room_udn: &str) -> Option<String> {
        self.inner.state.read().zone_udn_for_room(room_udn)
    }

    fn zone_exists(&self, zone_udn: &str) -> bool {
        self.inner.state.read().zones.contains_key(zone_udn)
    }

    fn renderer_udn_for_room(&self, room_udn: &str) -> Option<String> {
        self.inner
            .state
            .read()
            .rooms
            .get(room_udn)
            .map(|r| r.renderer_udn.clone())
    }

    fn renderer_udn_for_zone(&self, zone_udn: &str) -> Option<String> {
        self.inner
            .state
            .read()
            .zones
            .get(zone_udn)
            .map(|z| z.renderer_udn.clone())
    }

    fn zone_udns(&self) -> Vec<String> {
        self.inner.state.read().zones.keys().cloned().collect()
    }

    fn zone_config(&self) -> ZoneConfig {
        let state = self.inner.state.read();
        let zones = state
            .zones
            .iter()
            .map(|(udn, zone)| ZoneInfo {
                udn: udn.clone(),
                name: state.zone_name(zone),
                renderer_udn: zone.renderer_udn.clone(),
                rooms: zone
                    .rooms
                    .iter()
                    .filter_map(|r| state.room_info(r))
                    .collect(),
            })
            .collect();
        let unassigned_rooms = state
            .rooms
            .keys()
            .filter(|udn| state.zone_udn_for_room(udn).is_none())
            .filter_map(|udn| state.room_info(udn))
            .collect();
        ZoneConfig {
            zones,
            unassigned_rooms,
        }
    }
}

#[async_trait]
impl ZoneControl for VirtualFleet {
    async fn connect_rooms_to_zone(
        &self,
        zone_udn: Option<&str>,
        room_udns: &[String],
    ) -> BackendResult<()> {
        self.ensure_ready()?;
        {
            let state = self.inner.state.read();
            for room_udn in room_udns {
                self.ensure_room(&state, room_udn)?;
            }
            if let Some(zone_udn) = zone_udn {
                if !state.zones.contains_key(zone_udn) {
                    return Err(BackendError::UnknownDevice(zone_udn.to_string()));
                }
            }
        }
        if room_udns.is_empty() {
            return Err(BackendError::Rejected("No rooms to connect".to_string()));
        }

        log::debug!(
            "[Fleet] Connecting {:?} to zone {}",
            room_udns,
            zone_udn.unwrap_or("<new>")
        );

        let zone_udn = zone_udn.map(str::to_string);
        let rooms = room_udns.to_vec();
        self.schedule(Box::new(move |state| {
            let mut changed = vec![ResourceKey::ZoneConfig];
            match zone_udn {
                Some(zone_udn) if state.zones.contains_key(&zone_udn) => {
                    for room in &rooms {
                        changed.extend(state.detach_room(room, Some(&zone_udn)));
                        changed.extend(state.attach_room(&zone_udn, room));
                    }
                }
                Some(zone_udn) => {
                    log::warn!("[Fleet] Zone {} vanished before connect applied", zone_udn);
                }
                None => {
                    let new_zone = format!("uuid:zone-{}", uuid::Uuid::new_v4());
                    for room in &rooms {
                        changed.extend(state.detach_room(room, None));
                    }
                    changed.extend(state.create_zone(&new_zone, rooms));
                }
            }
            changed
        }));
        Ok(())
    }

    async fn drop_room(&self, room_udn: &str) -> BackendResult<()> {
        self.ensure_ready()?;
        self.ensure_room(&self.inner.state.read(), room_udn)?;

        let room = room_udn.to_string();
        self.schedule(Box::new(move |state| {
            let mut changed = state.detach_room(&room, None);
            changed.push(ResourceKey::ZoneConfig);
            changed
        }));
        Ok(())
    }
}

impl RendererStateSource for VirtualFleet {
    fn renderer_udns(&self) -> Vec<String> {
        let mut udns: Vec<String> = self.inner.state.read().renderers.keys().cloned().collect();
        udns.sort();
        udns
    }

    fn renderer_state(&self, renderer_udn: &str) -> Option<RendererState> {
        self.inner.state.read().renderers.get(renderer_udn).cloned()
    }
}

#[async_trait]
impl RendererControl for VirtualFleet {
    async fn play(&self, renderer_udn: &str) -> BackendResult<()> {
        self.update_group(renderer_udn, |r| {
            r.transport_state = TransportState::Playing;
            r.standby = None;
        })
    }

    async fn pause(&self, renderer_udn: &str) -> BackendResult<()> {
        self.update_group(renderer_udn, |r| {
            if r.transport_state == TransportState::Playing {
                r.transport_state = TransportState::PausedPlayback;
            }
        })
    }

    async fn stop(&self, renderer_udn: &str) -> BackendResult<()> {
        self.update_group(renderer_udn, |r| {
            r.transport_state = TransportState::Stopped;
            r.position_secs = 0;
        })
    }

    async fn next(&self, renderer_udn: &str) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        let udn = renderer_udn.to_string();
        self.schedule(Box::new(move |state| {
            let track = state.renderers.get(&udn).map_or(0, |r| r.track_number);
            if (track as usize) + 1 < state.queue_len(&udn) {
                state.jump_to_track(&udn, track + 1)
            } else {
                Vec::new()
            }
        }));
        Ok(())
    }

    async fn previous(&self, renderer_udn: &str) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        let udn = renderer_udn.to_string();
        self.schedule(Box::new(move |state| {
            let track = state.renderers.get(&udn).map_or(0, |r| r.track_number);
            state.jump_to_track(&udn, track.saturating_sub(1))
        }));
        Ok(())
    }

    async fn set_volume(&self, renderer_udn: &str, volume: u8) -> BackendResult<()> {
        let volume = volume.min(100);
        self.update_group(renderer_udn, move |r| r.volume = volume)
    }

    async fn set_mute(&self, renderer_udn: &str, mute: bool) -> BackendResult<()> {
        self.update_group(renderer_udn, move |r| r.mute = mute)
    }

    async fn set_play_mode(&self, renderer_udn: &str, mode: PlayMode) -> BackendResult<()> {
        self.update_renderer(renderer_udn, move |r| r.play_mode = mode)
    }

    async fn seek(&self, renderer_udn: &str, target: SeekTarget) -> BackendResult<()> {
        self.update_renderer(renderer_udn, move |r| {
            r.position_secs = match target {
                SeekTarget::Absolute(secs) => secs,
                SeekTarget::Relative(delta) => r.position_secs.saturating_add_signed(delta),
            };
        })
    }

    async fn seek_to_track(&self, renderer_udn: &str, track_number: u32) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        let len = self.inner.state.read().queue_len(renderer_udn);
        if track_number as usize >= len {
            return Err(BackendError::Rejected(format!(
                "Track {} out of range (queue has {} items)",
                track_number, len
            )));
        }
        let udn = renderer_udn.to_string();
        self.schedule(Box::new(move |state| state.jump_to_track(&udn, track_number)));
        Ok(())
    }

    async fn load_container(
        &self,
        renderer_udn: &str,
        container_id: &str,
        track_number: Option<u32>,
    ) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        let items = self
            .inner
            .state
            .read()
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| {
                BackendError::Rejected(format!("Unknown container '{}'", container_id))
            })?;
        let udn = renderer_udn.to_string();
        let track = track_number.unwrap_or(0);
        self.schedule(Box::new(move |state| state.load_queue(&udn, items, track)));
        Ok(())
    }

    async fn load_playlist(
        &self,
        renderer_udn: &str,
        playlist: &str,
        track_number: Option<u32>,
    ) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        let items = self
            .inner
            .state
            .read()
            .playlists
            .get(playlist)
            .cloned()
            .ok_or_else(|| BackendError::Rejected(format!("Unknown playlist '{}'", playlist)))?;
        let udn = renderer_udn.to_string();
        let track = track_number.unwrap_or(0);
        self.schedule(Box::new(move |state| state.load_queue(&udn, items, track)));
        Ok(())
    }

    async fn load_uri(&self, renderer_udn: &str, uri: &str) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        let udn = renderer_udn.to_string();
        let item = MediaItem::from_uri(uri);
        self.schedule(Box::new(move |state| state.load_queue(&udn, vec![item], 0)));
        Ok(())
    }

    async fn load_shuffle(&self, renderer_udn: &str, container_id: &str) -> BackendResult<()> {
        self.load_container(renderer_udn, container_id, None).await?;
        self.set_play_mode(renderer_udn, PlayMode::Shuffle).await
    }

    async fn set_sleep_timer(
        &self,
        renderer_udn: &str,
        seconds_until_sleep: u32,
        seconds_for_volume_ramp: u32,
    ) -> BackendResult<()> {
        self.update_renderer(renderer_udn, move |r| {
            r.sleep_timer = (seconds_until_sleep > 0).then_some(SleepTimer {
                seconds_until_sleep,
                seconds_for_volume_ramp,
            });
        })
    }

    async fn enter_standby(&self, renderer_udn: &str, mode: StandbyMode) -> BackendResult<()> {
        self.ensure_renderer(renderer_udn)?;
        if self
            .renderer_state(renderer_udn)
            .is_some_and(|r| r.virtual_renderer)
        {
            return Err(BackendError::Rejected(
                "Standby applies to room renderers only".to_string(),
            ));
        }
        self.update_renderer(renderer_udn, move |r| {
            r.standby = Some(mode);
            r.transport_state = TransportState::Stopped;
        })
    }

    async fn leave_standby(&self, renderer_udn: &str) -> BackendResult<()> {
        self.update_renderer(renderer_udn, |r| r.standby = None)
    }
}

impl MediaLibrary for VirtualFleet {
    fn media_list(&self, list_id: &str) -> Option<Vec<MediaItem>> {
        let state = self.inner.state.read();
        state
            .queues
            .get(list_id)
            .or_else(|| state.containers.get(list_id))
            .or_else(|| state.playlists.get(list_id))
            .cloned()
    }

    fn zone_queue_id(&self, zone_udn: &str) -> Option<String> {
        self.inner
            .state
            .read()
            .zones
            .get(zone_udn)
            .map(|z| queue_id(&z.renderer_udn))
    }
}

impl UpdateIdSource for VirtualFleet {
    fn update_id(&self, resource: &ResourceKey) -> u64 {
        self.inner.versions.current(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_fleet() -> VirtualFleet {
        VirtualFleet::new(FleetSpec::demo(), Duration::ZERO).unwrap()
    }

    #[test]
    fn demo_fleet_topology() {
        let fleet = instant_fleet();
        let config = fleet.zone_config();

        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.unassigned_rooms.len(), 1);
        assert_eq!(config.unassigned_rooms[0].name, "Bedroom");

        let kitchen = fleet.room_udn_for_name("kitchen").unwrap();
        assert_eq!(kitchen, "uuid:room-kitchen");
        assert_eq!(fleet.zone_udn_for_room(&kitchen).as_deref(), Some("uuid:zone-1"));
        assert_eq!(
            fleet.renderer_state("uuid:zone-1-vr").unwrap().name,
            "Kitchen, Living Room"
        );
    }

    #[test]
    fn unknown_room_in_zone_is_rejected() {
        let spec = FleetSpec {
            zones: vec![ZoneSpec {
                udn: None,
                rooms: vec!["Attic".into()],
            }],
            ..Default::default()
        };
        assert!(matches!(
            VirtualFleet::new(spec, Duration::ZERO),
            Err(BackendError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn dropping_last_room_removes_zone() {
        let fleet = instant_fleet();
        let office = fleet.room_udn_for_name("Office").unwrap();

        fleet.drop_room(&office).await.unwrap();

        assert!(fleet.zone_udn_for_room(&office).is_none());
        assert!(!fleet.zone_exists("uuid:zone-2"));
        assert!(fleet.renderer_state("uuid:zone-2-vr").is_none());
        assert!(fleet.update_id(&ResourceKey::ZoneConfig) > 0);
    }

    #[tokio::test]
    async fn connect_without_zone_creates_one() {
        let fleet = instant_fleet();
        let bedroom = fleet.room_udn_for_name("Bedroom").unwrap();

        fleet
            .connect_rooms_to_zone(None, std::slice::from_ref(&bedroom))
            .await
            .unwrap();

        let zone = fleet.zone_udn_for_room(&bedroom).unwrap();
        assert!(zone.starts_with("uuid:zone-"));
        assert_eq!(fleet.zone_udns().len(), 3);
    }

    #[tokio::test]
    async fn connect_moves_room_between_zones() {
        let fleet = instant_fleet();
        let office = fleet.room_udn_for_name("Office").unwrap();

        fleet
            .connect_rooms_to_zone(Some("uuid:zone-1"), std::slice::from_ref(&office))
            .await
            .unwrap();

        assert_eq!(fleet.zone_udn_for_room(&office).as_deref(), Some("uuid:zone-1"));
        assert!(!fleet.zone_exists("uuid:zone-2"));
    }

    #[tokio::test]
    async fn zone_volume_reaches_members() {
        let fleet = instant_fleet();
        fleet.set_volume("uuid:zone-1-vr", 150).await.unwrap();

        assert_eq!(fleet.renderer_state("uuid:zone-1-vr").unwrap().volume, 100);
        assert_eq!(
            fleet.renderer_state("uuid:renderer-kitchen").unwrap().volume,
            100
        );
        assert_eq!(fleet.renderer_state("uuid:renderer-office").unwrap().volume, 30);
    }

    #[tokio::test]
    async fn load_container_fills_queue() {
        let fleet = instant_fleet();
        fleet
            .load_container("uuid:zone-1-vr", "0/Albums/1", Some(1))
            .await
            .unwrap();

        let queue_id = fleet.zone_queue_id("uuid:zone-1").unwrap();
        assert_eq!(fleet.media_list(&queue_id).unwrap().len(), 3);
        let state = fleet.renderer_state("uuid:zone-1-vr").unwrap();
        assert_eq!(state.track_number, 1);
        assert_eq!(state.transport_state, TransportState::Playing);

        assert!(fleet.seek_to_track("uuid:zone-1-vr", 3).await.is_err());
    }

    #[tokio::test]
    async fn unknown_renderer_is_reported() {
        let fleet = instant_fleet();
        assert!(matches!(
            fleet.play("uuid:nope").await,
            Err(BackendError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn not_ready_rejects_commands() {
        let fleet = instant_fleet();
        fleet.set_ready(false);
        assert!(!fleet.is_ready());
        assert!(matches!(
            fleet.play("uuid:zone-1-vr").await,
            Err(BackendError::Unavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn changes_settle_after_delay() {
        let fleet = VirtualFleet::new(FleetSpec::demo(), Duration::from_millis(100)).unwrap();
        fleet.set_mute("uuid:renderer-office", true).await.unwrap();

        assert!(!fleet.renderer_state("uuid:renderer-office").unwrap().mute);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(fleet.renderer_state("uuid:renderer-office").unwrap().mute);
    }

    #[tokio::test(start_paused = true)]
    async fn frozen_fleet_never_converges() {
        let fleet = VirtualFleet::new(FleetSpec::demo(), Duration::from_millis(10)).unwrap();
        fleet.set_frozen(true);
        fleet.set_mute("uuid:renderer-office", true).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!fleet.renderer_state("uuid:renderer-office").unwrap().mute);
    }
}

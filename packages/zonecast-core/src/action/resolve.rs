//! Identifier resolution against the backend topology.
//!
//! Clients address rooms and zones by human-readable name or by UDN. Every
//! lookup is a single short backend call; nothing here holds state.

use crate::backend::ZoneTopology;
use crate::error::{ActionError, ActionResult};

use super::ActionOptions;

/// Option naming the addressed room, zone or list.
pub const OPTION_ID: &str = "id";

/// Option selecting room or zone renderers.
pub const OPTION_SCOPE: &str = "scope";

/// Which renderer a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// The zone's virtual renderer.
    #[default]
    Zone,
    /// The room's own renderer.
    Room,
}

impl Scope {
    /// Reads the `scope` option (`zone` or `room`).
    pub fn from_options(options: &ActionOptions) -> ActionResult<Self> {
        match options.get(OPTION_SCOPE).map(|s| s.trim().to_ascii_lowercase()) {
            None => Ok(Self::Zone),
            Some(s) if s.is_empty() || s == "zone" => Ok(Self::Zone),
            Some(s) if s == "room" => Ok(Self::Room),
            Some(s) => Err(ActionError::Validation(format!(
                "Option 'scope' has invalid value '{}'!",
                s
            ))),
        }
    }
}

/// Resolves a room name, falling back to the raw id as a room UDN.
pub fn resolve_room<T>(topology: &T, id: &str) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    if let Some(udn) = topology.room_udn_for_name(id) {
        return Ok(udn);
    }
    if topology.room_exists(id) {
        return Ok(id.to_string());
    }
    Err(ActionError::NotFound(format!("Room with ID '{}' not found!", id)))
}

/// Resolves a zone through a room it contains, falling back to the raw id as
/// a zone UDN.
pub fn resolve_zone<T>(topology: &T, id: &str) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    if let Ok(room_udn) = resolve_room(topology, id) {
        if let Some(zone_udn) = topology.zone_udn_for_room(&room_udn) {
            return Ok(zone_udn);
        }
    }
    if topology.zone_exists(id) {
        return Ok(id.to_string());
    }
    Err(ActionError::NotFound(format!("Zone with ID '{}' not found!", id)))
}

/// Renderer of a resolved room.
pub fn room_renderer<T>(topology: &T, room_udn: &str) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    topology
        .renderer_udn_for_room(room_udn)
        .ok_or_else(|| ActionError::NotFound(format!("No renderer for room '{}'!", room_udn)))
}

/// Virtual renderer of a resolved zone.
pub fn zone_renderer<T>(topology: &T, zone_udn: &str) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    topology
        .renderer_udn_for_zone(zone_udn)
        .ok_or_else(|| ActionError::NotFound(format!("No renderer for zone '{}'!", zone_udn)))
}

/// Resolves the renderer for a single addressed room or zone.
pub fn resolve_renderer<T>(topology: &T, id: &str, scope: Scope) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    match scope {
        Scope::Room => room_renderer(topology, &resolve_room(topology, id)?),
        Scope::Zone => zone_renderer(topology, &resolve_zone(topology, id)?),
    }
}

/// Renderers a transport or volume command applies to.
///
/// Without `id` the command addresses every zone.
pub fn target_renderers<T>(topology: &T, options: &ActionOptions) -> ActionResult<Vec<String>>
where
    T: ZoneTopology + ?Sized,
{
    let scope = Scope::from_options(options)?;
    match options.get(OPTION_ID).map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => Ok(vec![resolve_renderer(topology, id, scope)?]),
        None => topology
            .zone_udns()
            .iter()
            .map(|zone| zone_renderer(topology, zone))
            .collect(),
    }
}

/// Single renderer for commands that require `id`.
pub fn required_renderer<T>(topology: &T, options: &ActionOptions) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    let id = options.require(OPTION_ID)?;
    resolve_renderer(topology, id.trim(), Scope::from_options(options)?)
}

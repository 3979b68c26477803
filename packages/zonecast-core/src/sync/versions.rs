//! Per-resource version counters.
//!
//! Pure data structure without I/O. Backends own a registry and bump it from
//! their change notifications; the engine only reads it (through
//! [`UpdateIdSource`](crate::backend::UpdateIdSource)) to decide whether a
//! long-polling client has already seen the current state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Identity of a watchable resource.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum ResourceKey {
    /// The zone topology as a whole.
    ZoneConfig,
    /// One renderer's state, or any renderer's state when `None`.
    RendererState(Option<String>),
    /// A media list (container, playlist or zone queue).
    MediaList(String),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZoneConfig => write!(f, "zoneConfig"),
            Self::RendererState(Some(udn)) => write!(f, "rendererState/{}", udn),
            Self::RendererState(None) => write!(f, "rendererState/*"),
            Self::MediaList(id) => write!(f, "mediaList/{}", id),
        }
    }
}

/// Monotonic version counters keyed by resource.
///
/// Counters start at 0 and only ever increase.
#[derive(Debug, Default)]
pub struct UpdateIdRegistry {
    counters: DashMap<ResourceKey, AtomicU64>,
}

impl UpdateIdRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current version of a resource.
    #[must_use]
    pub fn current(&self, key: &ResourceKey) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Records a change of a resource and returns its new version.
    ///
    /// Bumping a specific renderer also bumps the any-renderer aggregate, so
    /// clients watching all renderers see every individual change.
    pub fn bump(&self, key: &ResourceKey) -> u64 {
        if let ResourceKey::RendererState(Some(_)) = key {
            self.increment(&ResourceKey::RendererState(None));
        }
        self.increment(key)
    }

    fn increment(&self, key: &ResourceKey) -> u64 {
        self.counters
            .entry(key.clone())
            .or_default()
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }
}

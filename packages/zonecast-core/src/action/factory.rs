//! Path to action resolution.
//!
//! The factory consults a registration table (kind -> constructor) instead of
//! a conditional chain, so embedders and tests can register their own kinds.

use std::collections::HashMap;

use super::{crash, media, query, standby, transport, volume, zone};
use super::{Action, ActionBase, ActionBehavior, ActionKind};
use crate::protocol_constants::{ACTION_PATH_SEGMENTS, API_ROOT, CONTROLLER_SEGMENT, DATA_SEGMENT};
use crate::state::ActionDefaults;

/// Builds the behavior for one action kind.
pub type ActionConstructor = fn() -> Box<dyn ActionBehavior>;

/// Resolves request paths into actions.
pub struct ActionFactory {
    constructors: HashMap<ActionKind, ActionConstructor>,
    defaults: ActionDefaults,
}

impl ActionFactory {
    /// Creates a factory with no registered kinds.
    pub fn empty(defaults: ActionDefaults) -> Self {
        Self {
            constructors: HashMap::new(),
            defaults,
        }
    }

    /// Creates a factory with every built-in kind registered.
    pub fn new(defaults: ActionDefaults) -> Self {
        let mut factory = Self::empty(defaults);
        transport::register(&mut factory);
        volume::register(&mut factory);
        media::register(&mut factory);
        zone::register(&mut factory);
        standby::register(&mut factory);
        query::register(&mut factory);
        crash::register(&mut factory);
        factory
    }

    /// Registers (or replaces) the constructor for a kind.
    pub fn register(&mut self, kind: ActionKind, constructor: ActionConstructor) {
        self.constructors.insert(kind, constructor);
    }

    #[must_use]
    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    #[must_use]
    pub fn defaults(&self) -> &ActionDefaults {
        &self.defaults
    }

    /// Resolves `/<root>/<controller|data>/<name>` into an action.
    ///
    /// Returns `None` for any other shape, an unknown name or an unregistered
    /// kind. When `query` is absent or empty, the query component of `path`
    /// (after `?`) is used instead.
    pub fn create_from_path(&self, path: &str, query: Option<&str>) -> Option<Action> {
        let (path_only, path_query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let segments: Vec<&str> = path_only.split('/').collect();
        if segments.len() != ACTION_PATH_SEGMENTS {
            return None;
        }
        if !segments[0].is_empty()
            || !segments[1].eq_ignore_ascii_case(API_ROOT)
            || !(segments[2].eq_ignore_ascii_case(CONTROLLER_SEGMENT)
                || segments[2].eq_ignore_ascii_case(DATA_SEGMENT))
        {
            return None;
        }

        let kind = ActionKind::from_name(segments[3]);
        let constructor = self.constructors.get(&kind)?;

        let query = query
            .filter(|q| !q.is_empty())
            .or(path_query)
            .unwrap_or_default();
        let base = ActionBase::new(kind, path_only, query, &self.defaults);
        Some(Action::new(base, constructor()))
    }
}

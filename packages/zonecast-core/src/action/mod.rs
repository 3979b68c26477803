//! Action model.
//!
//! An [`Action`] is one inbound request turned into a typed command or query.
//! It pairs the request data every action shares ([`ActionBase`]) with the
//! kind-specific logic ([`ActionBehavior`]) looked up by the [`ActionFactory`].
//!
//! # Module Structure
//!
//! - `options` - Query option parsing
//! - `factory` - Path to action resolution and the kind registry
//! - `resolve` - Room/zone/renderer identifier resolution
//! - `transport`, `volume`, `media`, `zone`, `standby` - Stackable commands
//! - `query` - Returnable (and long-pollable) reads, session control
//! - `crash` - Fault-injection diagnostic

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::Backend;
use crate::error::{ActionError, ActionResult};
use crate::protocol_constants::{OPTION_SYNC, OPTION_WAIT};
use crate::state::ActionDefaults;
use crate::sync::{poll_until, ResourceKey, SessionRegistry};

pub mod crash;
pub mod factory;
pub mod media;
pub mod options;
pub mod query;
pub mod resolve;
pub mod standby;
pub mod transport;
pub mod volume;
pub mod zone;

pub use factory::{ActionConstructor, ActionFactory};
pub use options::ActionOptions;

/// Upper bound for client-supplied delays (`wait`, fade `duration`).
///
/// Queued actions share one worker, so a single request may not hold it longer.
pub const MAX_CLIENT_DELAY: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Action Kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Undefined,
    Play,
    Pause,
    Stop,
    Next,
    Prev,
    SetVolume,
    VolumeUp,
    VolumeDown,
    VolumeChange,
    Mute,
    Unmute,
    ToggleMute,
    FadeToVolume,
    SetPlayMode,
    LoadPlaylist,
    LoadContainer,
    LoadUri,
    LoadShuffle,
    Seek,
    SeekToTrack,
    SleepTimer,
    CreateZone,
    AddToZone,
    DropFromZone,
    EnterAutomaticStandby,
    EnterManualStandby,
    LeaveStandby,
    Crash,
    KillSession,
    GetVersion,
    GetZoneConfig,
    GetRendererState,
    GetRendererTransportState,
    GetMediaList,
    GetZoneMediaList,
}

impl ActionKind {
    /// Every named kind (excludes `Undefined`).
    pub const ALL: [ActionKind; 35] = [
        Self::Play,
        Self::Pause,
        Self::Stop,
        Self::Next,
        Self::Prev,
        Self::SetVolume,
        Self::VolumeUp,
        Self::VolumeDown,
        Self::VolumeChange,
        Self::Mute,
        Self::Unmute,
        Self::ToggleMute,
        Self::FadeToVolume,
        Self::SetPlayMode,
        Self::LoadPlaylist,
        Self::LoadContainer,
        Self::LoadUri,
        Self::LoadShuffle,
        Self::Seek,
        Self::SeekToTrack,
        Self::SleepTimer,
        Self::CreateZone,
        Self::AddToZone,
        Self::DropFromZone,
        Self::EnterAutomaticStandby,
        Self::EnterManualStandby,
        Self::LeaveStandby,
        Self::Crash,
        Self::KillSession,
        Self::GetVersion,
        Self::GetZoneConfig,
        Self::GetRendererState,
        Self::GetRendererTransportState,
        Self::GetMediaList,
        Self::GetZoneMediaList,
    ];

    /// Canonical uppercase name; empty for `Undefined`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Stop => "STOP",
            Self::Next => "NEXT",
            Self::Prev => "PREV",
            Self::SetVolume => "SETVOLUME",
            Self::VolumeUp => "VOLUMEUP",
            Self::VolumeDown => "VOLUMEDOWN",
            Self::VolumeChange => "VOLUMECHANGE",
            Self::Mute => "MUTE",
            Self::Unmute => "UNMUTE",
            Self::ToggleMute => "TOGGLEMUTE",
            Self::FadeToVolume => "FADETOVOLUME",
            Self::SetPlayMode => "SETPLAYMODE",
            Self::LoadPlaylist => "LOADPLAYLIST",
            Self::LoadContainer => "LOADCONTAINER",
            Self::LoadUri => "LOADURI",
            Self::LoadShuffle => "LOADSHUFFLE",
            Self::Seek => "SEEK",
            Self::SeekToTrack => "SEEKTOTRACK",
            Self::SleepTimer => "SLEEPTIMER",
            Self::CreateZone => "CREATEZONE",
            Self::AddToZone => "ADDTOZONE",
            Self::DropFromZone => "DROPFROMZONE",
            Self::EnterAutomaticStandby => "ENTERAUTOMATICSTANDBY",
            Self::EnterManualStandby => "ENTERMANUALSTANDBY",
            Self::LeaveStandby => "LEAVESTANDBY",
            Self::Crash => "CRASH",
            Self::KillSession => "KILLSESSION",
            Self::GetVersion => "GETVERSION",
            Self::GetZoneConfig => "GETZONECONFIG",
            Self::GetRendererState => "GETRENDERERSTATE",
            Self::GetRendererTransportState => "GETRENDERERTRANSPORTSTATE",
            Self::GetMediaList => "GETMEDIALIST",
            Self::GetZoneMediaList => "GETZONEMEDIALIST",
        }
    }

    /// Case-insensitive lookup. Unknown names map to `Undefined`.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .unwrap_or(Self::Undefined)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle State
// ─────────────────────────────────────────────────────────────────────────────

/// Position of an action in the execution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Created,
    Parsed,
    Validated,
    Queued,
    Executing,
    Completed,
    Failed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared Request Data
// ─────────────────────────────────────────────────────────────────────────────

/// Collaborators handed to every action at validation and execution time.
#[derive(Clone)]
pub struct ActionContext {
    pub backend: Arc<dyn Backend>,
    pub sessions: Arc<SessionRegistry>,
}

impl ActionContext {
    pub fn new(backend: Arc<dyn Backend>, sessions: Arc<SessionRegistry>) -> Self {
        Self { backend, sessions }
    }
}

/// Request data common to every action kind.
///
/// Fixed at construction, except for the error log (append-only), the `sync`
/// flag (settled once during validation) and the lifecycle state.
#[derive(Debug, Clone)]
pub struct ActionBase {
    kind: ActionKind,
    raw_path: String,
    raw_query: String,
    options: ActionOptions,
    sync: bool,
    post_execution_wait: Duration,
    execution_timeout: Duration,
    poll_interval: Duration,
    long_poll_timeout: Duration,
    error_log: Vec<String>,
    state: ActionState,
}

impl ActionBase {
    pub fn new(
        kind: ActionKind,
        raw_path: &str,
        raw_query: &str,
        defaults: &ActionDefaults,
    ) -> Self {
        Self {
            kind,
            raw_path: raw_path.to_string(),
            raw_query: raw_query.to_string(),
            options: ActionOptions::default(),
            sync: true,
            post_execution_wait: Duration::from_millis(defaults.post_execution_wait_ms),
            execution_timeout: Duration::from_millis(defaults.execution_timeout_ms),
            poll_interval: defaults.poll_interval(),
            long_poll_timeout: Duration::from_millis(defaults.long_poll_timeout_ms),
            error_log: Vec::new(),
            state: ActionState::Created,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    #[must_use]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    #[must_use]
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    #[must_use]
    pub fn options(&self) -> &ActionOptions {
        &self.options
    }

    /// Whether the action waits for backend convergence.
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    #[must_use]
    pub fn post_execution_wait(&self) -> Duration {
        self.post_execution_wait
    }

    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn long_poll_timeout(&self) -> Duration {
        self.long_poll_timeout
    }

    #[must_use]
    pub fn state(&self) -> ActionState {
        self.state
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.error_log
    }

    /// Accumulated errors as one line.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.error_log.join("; ")
    }

    /// Signature used in logs: `KIND / key: value | key: value`.
    #[must_use]
    pub fn request_info(&self) -> String {
        let options = self
            .options
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(" | ");
        format!("{} / {}", self.kind, options)
    }

    pub(crate) fn set_state(&mut self, state: ActionState) {
        self.state = state;
    }

    /// Appends to the error log.
    pub(crate) fn push_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("[Pipeline] {} ({})", message, self.request_info());
        self.error_log.push(message);
    }

    /// `Created -> Parsed`. Never fails.
    pub(crate) fn parse(&mut self) {
        if self.state == ActionState::Created {
            self.options = ActionOptions::parse(&self.raw_query);
            self.state = ActionState::Parsed;
        }
    }

    /// Applies the options shared by every kind (`sync`, `wait`).
    pub(crate) fn apply_common_options(&mut self) -> ActionResult<()> {
        if let Some(sync) = self.options.get(OPTION_SYNC) {
            let sync = sync.trim();
            self.sync = !(sync.eq_ignore_ascii_case("false") || sync == "0");
        }
        if let Some(wait) = self.options.parse_opt::<u64>(OPTION_WAIT)? {
            let wait = Duration::from_millis(wait);
            if wait > MAX_CLIENT_DELAY {
                return Err(ActionError::Validation(format!(
                    "Option '{}' exceeds the maximum of {}ms!",
                    OPTION_WAIT,
                    MAX_CLIENT_DELAY.as_millis()
                )));
            }
            self.post_execution_wait = wait;
        }
        Ok(())
    }

    /// Waits for a post-condition when the action runs synchronously.
    ///
    /// A timeout is only a diagnostic: it is logged as a warning and the
    /// command still counts as executed. Returns whether the condition held.
    pub async fn await_convergence<P>(&self, expectation: &str, predicate: P) -> bool
    where
        P: FnMut() -> bool,
    {
        if !self.sync {
            return true;
        }
        let outcome = poll_until(predicate, self.poll_interval, self.execution_timeout).await;
        if !outcome.satisfied {
            log::warn!(
                "[Pipeline] Timeout on request after {}ms waiting for {}: {}",
                outcome.elapsed.as_millis(),
                expectation,
                self.request_info()
            );
        }
        outcome.satisfied
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behavior
// ─────────────────────────────────────────────────────────────────────────────

/// What a successful execution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// A command ran; there is no payload.
    Done,
    /// A command ran and reports a status line.
    Message(String),
    /// A returnable read produced a payload.
    Data(Value),
}

/// Kind-specific validation and execution logic.
///
/// Validation only reads; resolved identifiers are not cached because a queued
/// action may run after the topology changed, so execution resolves again.
#[async_trait]
pub trait ActionBehavior: Send + Sync {
    /// Whether the action may be queued for background execution.
    fn is_stackable(&self) -> bool {
        true
    }

    /// Whether the action answers with a data payload.
    fn is_returnable(&self) -> bool {
        false
    }

    /// Whether `sync=false` is acceptable.
    fn is_async_execution_allowed(&self) -> bool {
        true
    }

    /// Checks required options and resolves identifiers.
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()>;

    /// Runs the action.
    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput>;

    /// Resource a long-polling read waits on, if the action supports it.
    fn long_poll_resource(&self, _base: &ActionBase, _ctx: &ActionContext) -> Option<ResourceKey> {
        None
    }
}

/// One request, ready to be validated and executed.
pub struct Action {
    base: ActionBase,
    behavior: Box<dyn ActionBehavior>,
}

impl Action {
    pub fn new(base: ActionBase, behavior: Box<dyn ActionBehavior>) -> Self {
        Self { base, behavior }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.base.kind
    }

    #[must_use]
    pub fn base(&self) -> &ActionBase {
        &self.base
    }

    #[must_use]
    pub fn behavior(&self) -> &dyn ActionBehavior {
        self.behavior.as_ref()
    }

    #[must_use]
    pub fn is_stackable(&self) -> bool {
        self.behavior.is_stackable()
    }

    #[must_use]
    pub fn is_returnable(&self) -> bool {
        self.behavior.is_returnable()
    }

    /// Splits the borrow so the pipeline can run behavior against its base.
    pub(crate) fn parts_mut(&mut self) -> (&mut ActionBase, &dyn ActionBehavior) {
        (&mut self.base, self.behavior.as_ref())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.base.kind)
            .field("state", &self.base.state)
            .field("path", &self.base.raw_path)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::backend::{FleetSpec, VirtualFleet};
    use crate::error::ActionError;

    /// Demo fleet that applies commands instantly.
    pub fn context() -> (ActionContext, VirtualFleet) {
        let fleet = VirtualFleet::new(FleetSpec::demo(), Duration::ZERO).unwrap();
        let ctx = ActionContext::new(Arc::new(fleet.clone()), Arc::new(SessionRegistry::new()));
        (ctx, fleet)
    }

    /// Parses, validates and executes one request, surfacing the raw error.
    pub async fn run(ctx: &ActionContext, path: &str, query: &str) -> ActionResult<ActionOutput> {
        let factory = ActionFactory::new(ActionDefaults::default());
        let mut action = factory
            .create_from_path(path, Some(query))
            .ok_or_else(|| ActionError::NotFound(path.to_string()))?;
        let (base, behavior) = action.parts_mut();
        base.parse();
        base.apply_common_options()?;
        behavior.validate(base, ctx)?;
        behavior.execute(base, ctx).await
    }
}

//! Transport commands: play/pause/stop, track navigation, seeking, play mode
//! and sleep timer.

use async_trait::async_trait;

use super::resolve::{required_renderer, target_renderers};
use super::{ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput};
use crate::backend::{PlayMode, SeekTarget, TransportState};
use crate::error::{ActionError, ActionResult};

const OPTION_VALUE: &str = "value";
const OPTION_RELATIVE: &str = "relative";
const OPTION_TRACK_NUMBER: &str = "trackNumber";
const OPTION_MODE: &str = "mode";
const OPTION_SECONDS_UNTIL_SLEEP: &str = "secondsUntilSleep";
const OPTION_SECONDS_FOR_VOLUME_RAMP: &str = "secondsForVolumeRamp";

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::Play, || Box::new(Transport(TransportOp::Play)));
    factory.register(ActionKind::Pause, || Box::new(Transport(TransportOp::Pause)));
    factory.register(ActionKind::Stop, || Box::new(Transport(TransportOp::Stop)));
    factory.register(ActionKind::Next, || Box::new(Transport(TransportOp::Next)));
    factory.register(ActionKind::Prev, || Box::new(Transport(TransportOp::Prev)));
    factory.register(ActionKind::Seek, || Box::new(Seek));
    factory.register(ActionKind::SeekToTrack, || Box::new(SeekToTrack));
    factory.register(ActionKind::SetPlayMode, || Box::new(SetPlayMode));
    factory.register(ActionKind::SleepTimer, || Box::new(SleepTimer));
}

// ─────────────────────────────────────────────────────────────────────────────
// Play / Pause / Stop / Next / Prev
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportOp {
    Play,
    Pause,
    Stop,
    Next,
    Prev,
}

impl TransportOp {
    /// Post-condition on the renderer's transport state, if the op has one.
    fn converged(self, state: TransportState) -> Option<bool> {
        match self {
            Self::Play => Some(state == TransportState::Playing),
            Self::Pause => Some(state != TransportState::Playing),
            Self::Stop => Some(state == TransportState::Stopped),
            Self::Next | Self::Prev => None,
        }
    }
}

/// Transport command for one addressed zone/room, or every zone without `id`.
struct Transport(TransportOp);

#[async_trait]
impl ActionBehavior for Transport {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        target_renderers(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let renderers = target_renderers(backend, base.options())?;

        for udn in &renderers {
            match self.0 {
                TransportOp::Play => backend.play(udn).await?,
                TransportOp::Pause => backend.pause(udn).await?,
                TransportOp::Stop => backend.stop(udn).await?,
                TransportOp::Next => backend.next(udn).await?,
                TransportOp::Prev => backend.previous(udn).await?,
            }
        }

        if self.0.converged(TransportState::Stopped).is_some() {
            let op = self.0;
            base.await_convergence("transport state", || {
                renderers.iter().all(|udn| {
                    backend
                        .renderer_state(udn)
                        .and_then(|s| op.converged(s.transport_state))
                        .unwrap_or(false)
                })
            })
            .await;
        }

        Ok(ActionOutput::Done)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Seek
// ─────────────────────────────────────────────────────────────────────────────

struct Seek;

impl Seek {
    fn target(base: &ActionBase) -> ActionResult<SeekTarget> {
        let relative = base.options().flag(OPTION_RELATIVE)?.unwrap_or(false);
        if relative {
            Ok(SeekTarget::Relative(base.options().require_parsed(OPTION_VALUE)?))
        } else {
            Ok(SeekTarget::Absolute(base.options().require_parsed(OPTION_VALUE)?))
        }
    }
}

#[async_trait]
impl ActionBehavior for Seek {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        Self::target(base)?;
        required_renderer(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let renderer = required_renderer(ctx.backend.as_ref(), base.options())?;
        ctx.backend.seek(&renderer, Self::target(base)?).await?;
        Ok(ActionOutput::Done)
    }
}

struct SeekToTrack;

#[async_trait]
impl ActionBehavior for SeekToTrack {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        base.options().require_parsed::<u32>(OPTION_TRACK_NUMBER)?;
        required_renderer(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let track: u32 = base.options().require_parsed(OPTION_TRACK_NUMBER)?;
        let renderer = required_renderer(ctx.backend.as_ref(), base.options())?;
        ctx.backend.seek_to_track(&renderer, track).await?;
        Ok(ActionOutput::Done)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Play Mode / Sleep Timer
// ─────────────────────────────────────────────────────────────────────────────

struct SetPlayMode;

impl SetPlayMode {
    fn mode(base: &ActionBase) -> ActionResult<PlayMode> {
        let value = base.options().require(OPTION_MODE)?;
        PlayMode::parse(value).ok_or_else(|| {
            ActionError::Validation(format!("Play mode '{}' is not supported!", value))
        })
    }
}

#[async_trait]
impl ActionBehavior for SetPlayMode {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        Self::mode(base)?;
        required_renderer(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let renderer = required_renderer(ctx.backend.as_ref(), base.options())?;
        ctx.backend.set_play_mode(&renderer, Self::mode(base)?).await?;
        Ok(ActionOutput::Done)
    }
}

struct SleepTimer;

impl SleepTimer {
    fn timings(base: &ActionBase) -> ActionResult<(u32, u32)> {
        let until: u32 = base.options().require_parsed(OPTION_SECONDS_UNTIL_SLEEP)?;
        let ramp: u32 = base
            .options()
            .parse_opt(OPTION_SECONDS_FOR_VOLUME_RAMP)?
            .unwrap_or(0);
        Ok((until, ramp))
    }
}

#[async_trait]
impl ActionBehavior for SleepTimer {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        Self::timings(base)?;
        required_renderer(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let (until, ramp) = Self::timings(base)?;
        let renderer = required_renderer(ctx.backend.as_ref(), base.options())?;
        ctx.backend.set_sleep_timer(&renderer, until, ramp).await?;
        Ok(ActionOutput::Done)
    }
}

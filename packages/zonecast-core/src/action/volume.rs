//! Volume and mute commands.

use std::time::Duration;

use async_trait::async_trait;

use super::resolve::target_renderers;
use super::{
    ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput,
    MAX_CLIENT_DELAY,
};
use crate::backend::Backend;
use crate::error::{ActionError, ActionResult};

const OPTION_VALUE: &str = "value";
const OPTION_DURATION: &str = "duration";

const MAX_VOLUME: i32 = 100;
const DEFAULT_VOLUME_STEP: i32 = 2;
const DEFAULT_FADE_DURATION_MS: u64 = 2000;

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::SetVolume, || Box::new(SetVolume));
    factory.register(ActionKind::VolumeUp, || Box::new(StepVolume { direction: 1 }));
    factory.register(ActionKind::VolumeDown, || Box::new(StepVolume { direction: -1 }));
    factory.register(ActionKind::VolumeChange, || Box::new(VolumeChange));
    factory.register(ActionKind::Mute, || Box::new(Mute(MuteOp::On)));
    factory.register(ActionKind::Unmute, || Box::new(Mute(MuteOp::Off)));
    factory.register(ActionKind::ToggleMute, || Box::new(Mute(MuteOp::Toggle)));
    factory.register(ActionKind::FadeToVolume, || Box::new(FadeToVolume));
}

fn clamp_volume(value: i32) -> u8 {
    // Clamped to 0..=100, so the cast is lossless.
    value.clamp(0, MAX_VOLUME) as u8
}

fn required_volume(base: &ActionBase) -> ActionResult<u8> {
    let value: i32 = base.options().require_parsed(OPTION_VALUE)?;
    if !(0..=MAX_VOLUME).contains(&value) {
        return Err(ActionError::Validation(format!(
            "Volume {} is out of range (0-{})!",
            value, MAX_VOLUME
        )));
    }
    Ok(clamp_volume(value))
}

fn current_volume(backend: &dyn Backend, renderer_udn: &str) -> ActionResult<i32> {
    backend
        .renderer_state(renderer_udn)
        .map(|s| i32::from(s.volume))
        .ok_or_else(|| ActionError::NotFound(format!("Renderer '{}' not found!", renderer_udn)))
}

/// Applies a relative volume change to every target.
async fn shift_volume(
    base: &ActionBase,
    ctx: &ActionContext,
    delta: i32,
) -> ActionResult<ActionOutput> {
    let backend = ctx.backend.as_ref();
    for udn in target_renderers(backend, base.options())? {
        let volume = clamp_volume(current_volume(backend, &udn)?.saturating_add(delta));
        backend.set_volume(&udn, volume).await?;
    }
    Ok(ActionOutput::Done)
}

// ─────────────────────────────────────────────────────────────────────────────
// Absolute / Relative Volume
// ─────────────────────────────────────────────────────────────────────────────

struct SetVolume;

#[async_trait]
impl ActionBehavior for SetVolume {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        required_volume(base)?;
        target_renderers(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let volume = required_volume(base)?;
        let renderers = target_renderers(backend, base.options())?;

        for udn in &renderers {
            backend.set_volume(udn, volume).await?;
        }

        base.await_convergence("volume", || {
            renderers
                .iter()
                .all(|udn| backend.renderer_state(udn).is_some_and(|s| s.volume == volume))
        })
        .await;

        Ok(ActionOutput::Done)
    }
}

/// `VOLUMEUP` / `VOLUMEDOWN` with an optional step size.
struct StepVolume {
    direction: i32,
}

impl StepVolume {
    fn step(base: &ActionBase) -> ActionResult<i32> {
        let step: i32 = base
            .options()
            .parse_opt(OPTION_VALUE)?
            .unwrap_or(DEFAULT_VOLUME_STEP);
        if step < 0 {
            return Err(ActionError::Validation(
                "Volume step must not be negative!".to_string(),
            ));
        }
        Ok(step)
    }
}

#[async_trait]
impl ActionBehavior for StepVolume {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        Self::step(base)?;
        target_renderers(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        shift_volume(base, ctx, self.direction.saturating_mul(Self::step(base)?)).await
    }
}

struct VolumeChange;

#[async_trait]
impl ActionBehavior for VolumeChange {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        base.options().require_parsed::<i32>(OPTION_VALUE)?;
        target_renderers(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let delta: i32 = base.options().require_parsed(OPTION_VALUE)?;
        shift_volume(base, ctx, delta).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mute
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum MuteOp {
    On,
    Off,
    Toggle,
}

struct Mute(MuteOp);

#[async_trait]
impl ActionBehavior for Mute {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        target_renderers(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let mut expected = Vec::new();

        for udn in target_renderers(backend, base.options())? {
            let mute = match self.0 {
                MuteOp::On => true,
                MuteOp::Off => false,
                MuteOp::Toggle => !backend.renderer_state(&udn).is_some_and(|s| s.mute),
            };
            backend.set_mute(&udn, mute).await?;
            expected.push((udn, mute));
        }

        base.await_convergence("mute state", || {
            expected
                .iter()
                .all(|(udn, mute)| backend.renderer_state(udn).is_some_and(|s| s.mute == *mute))
        })
        .await;

        Ok(ActionOutput::Done)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fade
// ─────────────────────────────────────────────────────────────────────────────

/// Ramps volume to a target in one-point steps spread over `duration`.
struct FadeToVolume;

impl FadeToVolume {
    fn duration(base: &ActionBase) -> ActionResult<Duration> {
        let duration = Duration::from_millis(
            base.options()
                .parse_opt(OPTION_DURATION)?
                .unwrap_or(DEFAULT_FADE_DURATION_MS),
        );
        if duration > MAX_CLIENT_DELAY {
            return Err(ActionError::Validation(format!(
                "Fade duration exceeds the maximum of {}ms!",
                MAX_CLIENT_DELAY.as_millis()
            )));
        }
        Ok(duration)
    }
}

#[async_trait]
impl ActionBehavior for FadeToVolume {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        required_volume(base)?;
        Self::duration(base)?;
        target_renderers(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let target = i32::from(required_volume(base)?);
        let duration = Self::duration(base)?;

        let mut ramps = Vec::new();
        for udn in target_renderers(backend, base.options())? {
            let start = current_volume(backend, &udn)?;
            ramps.push((udn, start));
        }

        let steps = ramps
            .iter()
            .map(|(_, start)| (target - start).abs())
            .max()
            .unwrap_or(0)
            .max(1);
        let step_delay = duration / steps.unsigned_abs();

        for step in 1..=steps {
            for (udn, start) in &ramps {
                let volume = start + (target - start) * step / steps;
                backend.set_volume(udn, clamp_volume(volume)).await?;
            }
            if step < steps {
                tokio::time::sleep(step_delay).await;
            }
        }

        let target = clamp_volume(target);
        base.await_convergence("faded volume", || {
            ramps
                .iter()
                .all(|(udn, _)| backend.renderer_state(udn).is_some_and(|s| s.volume == target))
        })
        .await;

        Ok(ActionOutput::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{context, run};
    use crate::backend::RendererStateSource;

    fn volume(fleet: &crate::backend::VirtualFleet, udn: &str) -> u8 {
        fleet.renderer_state(udn).unwrap().volume
    }

    #[tokio::test]
    async fn set_volume_room_scope() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/setVolume", "id=Kitchen&scope=room&value=55")
            .await
            .unwrap();
        assert_eq!(volume(&fleet, "uuid:renderer-kitchen"), 55);
        assert_eq!(volume(&fleet, "uuid:renderer-living-room"), 30);
    }

    #[tokio::test]
    async fn set_volume_rejects_out_of_range() {
        let (ctx, _) = context();
        let err = run(&ctx, "/zonecast/controller/setVolume", "id=Kitchen&value=120")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert!(run(&ctx, "/zonecast/controller/setVolume", "id=Kitchen")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn step_and_change_clamp() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/volumeUp", "id=Office").await.unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 32);

        run(&ctx, "/zonecast/controller/volumeDown", "id=Office&value=10").await.unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 22);

        run(&ctx, "/zonecast/controller/volumeChange", "id=Office&value=-50").await.unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 0);
    }

    #[tokio::test]
    async fn toggle_mute_flips_state() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/toggleMute", "id=Office&scope=room").await.unwrap();
        assert!(fleet.renderer_state("uuid:renderer-office").unwrap().mute);

        run(&ctx, "/zonecast/controller/toggleMute", "id=Office&scope=room").await.unwrap();
        assert!(!fleet.renderer_state("uuid:renderer-office").unwrap().mute);
    }

    #[tokio::test(start_paused = true)]
    async fn fade_ramps_over_duration() {
        let (ctx, fleet) = context();
        let started = tokio::time::Instant::now();

        let query = "id=Office&scope=room&value=40&duration=1000";
        run(&ctx, "/zonecast/controller/fadeToVolume", query)
            .await
            .unwrap();

        assert_eq!(volume(&fleet, "uuid:renderer-office"), 40);
        assert_eq!(started.elapsed(), Duration::from_millis(900));
    }

    #[tokio::test]
    async fn extreme_relative_changes_saturate() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/volumeChange", "id=Office&value=2147483647")
            .await
            .unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 100);

        run(&ctx, "/zonecast/controller/volumeDown", "id=Office&value=2147483647")
            .await
            .unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 0);

        run(&ctx, "/zonecast/controller/volumeChange", "id=Office&value=-2147483648")
            .await
            .unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 0);

        run(&ctx, "/zonecast/controller/volumeUp", "id=Office&value=2147483647")
            .await
            .unwrap();
        assert_eq!(volume(&fleet, "uuid:zone-2-vr"), 100);
    }

    #[tokio::test]
    async fn fade_rejects_excessive_duration() {
        let (ctx, _) = context();
        let err = run(
            &ctx,
            "/zonecast/controller/fadeToVolume",
            "id=Office&value=40&duration=3600000",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }
}

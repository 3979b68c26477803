//! Room standby commands.

use async_trait::async_trait;

use super::resolve::{resolve_room, room_renderer, OPTION_ID};
use super::{ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput};
use crate::backend::{StandbyMode, ZoneTopology};
use crate::error::ActionResult;

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::EnterAutomaticStandby, || {
        Box::new(Standby(Some(StandbyMode::Automatic)))
    });
    factory.register(ActionKind::EnterManualStandby, || {
        Box::new(Standby(Some(StandbyMode::Manual)))
    });
    factory.register(ActionKind::LeaveStandby, || Box::new(Standby(None)));
}

/// Enters (`Some`) or leaves (`None`) standby on a room's renderer.
struct Standby(Option<StandbyMode>);

fn renderer<T: ZoneTopology + ?Sized>(topology: &T, base: &ActionBase) -> ActionResult<String> {
    let room = resolve_room(topology, base.options().require(OPTION_ID)?.trim())?;
    room_renderer(topology, &room)
}

#[async_trait]
impl ActionBehavior for Standby {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        renderer(ctx.backend.as_ref(), base).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let udn = renderer(ctx.backend.as_ref(), base)?;
        match self.0 {
            Some(mode) => ctx.backend.enter_standby(&udn, mode).await?,
            None => ctx.backend.leave_standby(&udn).await?,
        }
        Ok(ActionOutput::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{context, run};
    use crate::backend::RendererStateSource;

    #[tokio::test]
    async fn standby_round_trip() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/enterManualStandby", "id=Bedroom")
            .await
            .unwrap();
        assert_eq!(
            fleet.renderer_state("uuid:renderer-bedroom").unwrap().standby,
            Some(StandbyMode::Manual)
        );

        run(&ctx, "/zonecast/controller/leaveStandby", "id=Bedroom")
            .await
            .unwrap();
        assert!(fleet.renderer_state("uuid:renderer-bedroom").unwrap().standby.is_none());
    }
}

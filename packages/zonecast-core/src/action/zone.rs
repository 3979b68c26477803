//! Zone topology commands.
//!
//! Topology changes take hundreds of milliseconds to land on real devices, so
//! each command waits (when `sync`) until the backend reports the expected
//! membership before it is considered done.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::resolve::{resolve_room, resolve_zone, OPTION_ID};
use super::{ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput};
use crate::backend::ZoneTopology;
use crate::error::{ActionError, ActionResult};

const OPTION_ZONE_ID: &str = "zoneId";

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::CreateZone, || Box::new(CreateZone));
    factory.register(ActionKind::AddToZone, || Box::new(AddToZone));
    factory.register(ActionKind::DropFromZone, || Box::new(DropFromZone));
}

fn required_room<T>(topology: &T, base: &ActionBase) -> ActionResult<String>
where
    T: ZoneTopology + ?Sized,
{
    resolve_room(topology, base.options().require(OPTION_ID)?.trim())
}

fn required_rooms<T>(topology: &T, base: &ActionBase) -> ActionResult<Vec<String>>
where
    T: ZoneTopology + ?Sized,
{
    let ids = base.options().get_multiple(OPTION_ID);
    if ids.is_empty() {
        return Err(ActionError::Validation(format!(
            "Option '{}' is required!",
            OPTION_ID
        )));
    }
    ids.iter().map(|id| resolve_room(topology, id)).collect()
}

/// Forms a new zone from the listed rooms (`id=Kitchen,Office`).
struct CreateZone;

#[async_trait]
impl ActionBehavior for CreateZone {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        required_rooms(ctx.backend.as_ref(), base).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let rooms = required_rooms(backend, base)?;
        backend.connect_rooms_to_zone(None, &rooms).await?;

        let wanted: BTreeSet<&str> = rooms.iter().map(String::as_str).collect();
        base.await_convergence("rooms to share a new zone", || {
            backend.zone_config().zones.iter().any(|zone| {
                zone.rooms.iter().map(|r| r.udn.as_str()).collect::<BTreeSet<_>>() == wanted
            })
        })
        .await;

        Ok(ActionOutput::Done)
    }
}

/// Moves a room into the zone addressed by `zoneId` (zone UDN or a member room).
struct AddToZone;

impl AddToZone {
    fn target_zone<T>(topology: &T, base: &ActionBase) -> ActionResult<String>
    where
        T: ZoneTopology + ?Sized,
    {
        resolve_zone(topology, base.options().require(OPTION_ZONE_ID)?.trim())
    }
}

#[async_trait]
impl ActionBehavior for AddToZone {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        required_room(ctx.backend.as_ref(), base)?;
        Self::target_zone(ctx.backend.as_ref(), base).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let room = required_room(backend, base)?;
        let zone = Self::target_zone(backend, base)?;

        backend
            .connect_rooms_to_zone(Some(&zone), std::slice::from_ref(&room))
            .await?;

        base.await_convergence("room to join zone", || {
            backend.zone_udn_for_room(&room).as_deref() == Some(zone.as_str())
        })
        .await;

        Ok(ActionOutput::Done)
    }
}

/// Removes a room from whatever zone it is in.
struct DropFromZone;

#[async_trait]
impl ActionBehavior for DropFromZone {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        required_room(ctx.backend.as_ref(), base).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let room = required_room(backend, base)?;
        backend.drop_room(&room).await?;

        base.await_convergence("room to leave its zone", || {
            backend.zone_udn_for_room(&room).is_none()
        })
        .await;

        Ok(ActionOutput::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{context, run};
    use crate::backend::{FleetSpec, VirtualFleet};
    use crate::state::ActionDefaults;
    use crate::sync::SessionRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn drop_from_zone_detaches_room() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/dropFromZone", "id=Kitchen").await.unwrap();
        assert!(fleet.zone_udn_for_room("uuid:room-kitchen").is_none());
        assert!(fleet.zone_exists("uuid:zone-1"));
    }

    #[tokio::test]
    async fn drop_from_zone_requires_id() {
        let (ctx, _) = context();
        let err = run(&ctx, "/zonecast/controller/dropFromZone", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Option 'id' is required!");

        let err = run(&ctx, "/zonecast/controller/dropFromZone", "id=Garage")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    #[tokio::test]
    async fn add_to_zone_by_member_room() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/addToZone", "id=Bedroom&zoneId=Office")
            .await
            .unwrap();
        assert_eq!(
            fleet.zone_udn_for_room("uuid:room-bedroom").as_deref(),
            Some("uuid:zone-2")
        );
    }

    #[tokio::test]
    async fn create_zone_groups_rooms() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/createZone", "id=Bedroom,Office")
            .await
            .unwrap();

        let zone = fleet.zone_udn_for_room("uuid:room-bedroom").unwrap();
        assert_eq!(fleet.zone_udn_for_room("uuid:room-office"), Some(zone));
        assert!(!fleet.zone_exists("uuid:zone-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_converging_drop_waits_for_timeout_then_succeeds() {
        let fleet = VirtualFleet::new(FleetSpec::demo(), Duration::from_millis(10)).unwrap();
        fleet.set_frozen(true);
        let ctx = ActionContext::new(Arc::new(fleet.clone()), Arc::new(SessionRegistry::new()));

        let factory = ActionFactory::new(ActionDefaults {
            execution_timeout_ms: 200,
            ..Default::default()
        });
        let mut action = factory
            .create_from_path("/zonecast/controller/dropFromZone", Some("id=Kitchen"))
            .unwrap();
        let (base, behavior) = action.parts_mut();
        base.parse();
        base.apply_common_options().unwrap();
        behavior.validate(base, &ctx).unwrap();

        let started = tokio::time::Instant::now();
        behavior.execute(base, &ctx).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(200));
        assert!(fleet.zone_udn_for_room("uuid:room-kitchen").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn async_drop_returns_before_convergence() {
        let fleet = VirtualFleet::new(FleetSpec::demo(), Duration::from_millis(300)).unwrap();
        let ctx = ActionContext::new(Arc::new(fleet.clone()), Arc::new(SessionRegistry::new()));

        let started = tokio::time::Instant::now();
        run(&ctx, "/zonecast/controller/dropFromZone", "id=Kitchen&sync=false")
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(fleet.zone_udn_for_room("uuid:room-kitchen").is_some());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(fleet.zone_udn_for_room("uuid:room-kitchen").is_none());
    }
}

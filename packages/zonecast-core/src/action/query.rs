//! Returnable reads and session control.
//!
//! Returnable actions answer inline with a JSON payload and never go through
//! the queue. Most of them are long-pollable: they name the resource whose
//! version the client may block on.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::resolve::{resolve_renderer, resolve_zone, Scope, OPTION_ID};
use super::{ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput};
use crate::backend::Backend;
use crate::error::{ActionError, ActionResult};
use crate::protocol_constants::{APP_NAME, OPTION_SESSION_ID};
use crate::sync::ResourceKey;

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::GetVersion, || Box::new(GetVersion));
    factory.register(ActionKind::GetZoneConfig, || Box::new(GetZoneConfig));
    factory.register(ActionKind::GetRendererState, || {
        Box::new(GetRendererState { transport_only: false })
    });
    factory.register(ActionKind::GetRendererTransportState, || {
        Box::new(GetRendererState { transport_only: true })
    });
    factory.register(ActionKind::GetMediaList, || Box::new(GetMediaList));
    factory.register(ActionKind::GetZoneMediaList, || Box::new(GetZoneMediaList));
    factory.register(ActionKind::KillSession, || Box::new(KillSession));
}

fn to_payload<T: Serialize>(value: &T) -> ActionResult<ActionOutput> {
    serde_json::to_value(value)
        .map(ActionOutput::Data)
        .map_err(|e| ActionError::Execution(format!("Failed to encode payload: {}", e)))
}

/// Returnable reads share their capability flags.
macro_rules! returnable {
    () => {
        fn is_stackable(&self) -> bool {
            false
        }

        fn is_returnable(&self) -> bool {
            true
        }

        fn is_async_execution_allowed(&self) -> bool {
            false
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Version / Topology
// ─────────────────────────────────────────────────────────────────────────────

struct GetVersion;

#[async_trait]
impl ActionBehavior for GetVersion {
    returnable!();

    fn validate(&self, _base: &ActionBase, _ctx: &ActionContext) -> ActionResult<()> {
        Ok(())
    }

    async fn execute(&self, _base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        Ok(ActionOutput::Data(json!({
            "appName": APP_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "backendVersion": ctx.backend.backend_version(),
        })))
    }
}

struct GetZoneConfig;

#[async_trait]
impl ActionBehavior for GetZoneConfig {
    returnable!();

    fn validate(&self, _base: &ActionBase, _ctx: &ActionContext) -> ActionResult<()> {
        Ok(())
    }

    async fn execute(&self, _base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        to_payload(&ctx.backend.zone_config())
    }

    fn long_poll_resource(&self, _base: &ActionBase, _ctx: &ActionContext) -> Option<ResourceKey> {
        Some(ResourceKey::ZoneConfig)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderer State
// ─────────────────────────────────────────────────────────────────────────────

/// Full or transport-only state of one renderer (`id`) or of all renderers.
struct GetRendererState {
    transport_only: bool,
}

impl GetRendererState {
    /// `None` means every renderer.
    fn addressed(backend: &dyn Backend, base: &ActionBase) -> ActionResult<Option<String>> {
        match base.options().get(OPTION_ID).map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                let scope = Scope::from_options(base.options())?;
                resolve_renderer(backend, id, scope).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ActionBehavior for GetRendererState {
    returnable!();

    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        Self::addressed(ctx.backend.as_ref(), base).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let backend = ctx.backend.as_ref();
        let udns = match Self::addressed(backend, base)? {
            Some(udn) => vec![udn],
            None => backend.renderer_udns(),
        };
        let states: Vec<_> = udns
            .iter()
            .filter_map(|udn| backend.renderer_state(udn))
            .collect();

        if self.transport_only {
            let snapshots: Vec<_> = states.iter().map(|s| s.transport_snapshot()).collect();
            to_payload(&snapshots)
        } else {
            to_payload(&states)
        }
    }

    fn long_poll_resource(&self, base: &ActionBase, ctx: &ActionContext) -> Option<ResourceKey> {
        Self::addressed(ctx.backend.as_ref(), base)
            .ok()
            .map(ResourceKey::RendererState)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Media Lists
// ─────────────────────────────────────────────────────────────────────────────

/// Items of a container, playlist or queue addressed by list id.
struct GetMediaList;

#[async_trait]
impl ActionBehavior for GetMediaList {
    returnable!();

    fn validate(&self, base: &ActionBase, _ctx: &ActionContext) -> ActionResult<()> {
        base.options().require(OPTION_ID).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let id = base.options().require(OPTION_ID)?;
        let items = ctx
            .backend
            .media_list(id)
            .ok_or_else(|| ActionError::NotFound(format!("Media list '{}' not found!", id)))?;
        to_payload(&items)
    }

    fn long_poll_resource(&self, base: &ActionBase, _ctx: &ActionContext) -> Option<ResourceKey> {
        base.options()
            .get(OPTION_ID)
            .map(|id| ResourceKey::MediaList(id.to_string()))
    }
}

/// The play queue of a zone. An unloaded queue reads as empty.
struct GetZoneMediaList;

impl GetZoneMediaList {
    fn queue_id(backend: &dyn Backend, base: &ActionBase) -> ActionResult<String> {
        let zone = resolve_zone(backend, base.options().require(OPTION_ID)?.trim())?;
        backend
            .zone_queue_id(&zone)
            .ok_or_else(|| ActionError::NotFound(format!("Zone '{}' has no queue!", zone)))
    }
}

#[async_trait]
impl ActionBehavior for GetZoneMediaList {
    returnable!();

    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        Self::queue_id(ctx.backend.as_ref(), base).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let queue = Self::queue_id(ctx.backend.as_ref(), base)?;
        let items = ctx.backend.media_list(&queue).unwrap_or_default();
        to_payload(&items)
    }

    fn long_poll_resource(&self, base: &ActionBase, ctx: &ActionContext) -> Option<ResourceKey> {
        Self::queue_id(ctx.backend.as_ref(), base)
            .ok()
            .map(ResourceKey::MediaList)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// Forgets a long-polling client session. Runs inline.
struct KillSession;

#[async_trait]
impl ActionBehavior for KillSession {
    fn is_stackable(&self) -> bool {
        false
    }

    fn validate(&self, base: &ActionBase, _ctx: &ActionContext) -> ActionResult<()> {
        base.options().require(OPTION_SESSION_ID).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let session = base.options().require(OPTION_SESSION_ID)?;
        let message = if ctx.sessions.remove(session) {
            format!("Session '{}' was killed!", session)
        } else {
            format!("Session '{}' does not exist!", session)
        };
        log::info!("[Sessions] {}", message);
        Ok(ActionOutput::Message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{context, run};
    use crate::backend::RendererControl;

    fn data(output: ActionOutput) -> Value {
        match output {
            ActionOutput::Data(value) => value,
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn version_names_app() {
        let (ctx, _) = context();
        let value = data(run(&ctx, "/zonecast/data/getVersion", "").await.unwrap());
        assert_eq!(value["appName"], "Zonecast");
        assert!(value["backendVersion"].as_str().unwrap().starts_with("virtual-fleet/"));
    }

    #[tokio::test]
    async fn zone_config_lists_zones() {
        let (ctx, _) = context();
        let value = data(run(&ctx, "/zonecast/data/getZoneConfig", "").await.unwrap());
        assert_eq!(value["zones"].as_array().unwrap().len(), 2);
        assert_eq!(value["unassignedRooms"][0]["name"], "Bedroom");
    }

    #[tokio::test]
    async fn renderer_state_single_and_all() {
        let (ctx, fleet) = context();
        let one = data(
            run(&ctx, "/zonecast/data/getRendererState", "id=Kitchen&scope=room")
                .await
                .unwrap(),
        );
        assert_eq!(one.as_array().unwrap().len(), 1);
        assert_eq!(one[0]["udn"], "uuid:renderer-kitchen");

        let all = data(run(&ctx, "/zonecast/data/getRendererState", "").await.unwrap());
        assert_eq!(all.as_array().unwrap().len(), 6);

        fleet.play("uuid:zone-2-vr").await.unwrap();
        let transport = data(
            run(&ctx, "/zonecast/data/getRendererTransportState", "id=Office")
                .await
                .unwrap(),
        );
        assert_eq!(transport[0]["transportState"], "PLAYING");
        assert!(transport[0].get("volume").is_none());
    }

    #[tokio::test]
    async fn long_poll_resources_follow_options() {
        let (ctx, _) = context();
        let factory = ActionFactory::new(Default::default());

        let mut action = factory
            .create_from_path("/zonecast/data/getRendererState", Some("id=Office"))
            .unwrap();
        let (base, behavior) = action.parts_mut();
        base.parse();
        assert_eq!(
            behavior.long_poll_resource(base, &ctx),
            Some(ResourceKey::RendererState(Some("uuid:zone-2-vr".into())))
        );

        let mut action = factory
            .create_from_path("/zonecast/data/getZoneMediaList", Some("id=Office"))
            .unwrap();
        let (base, behavior) = action.parts_mut();
        base.parse();
        assert_eq!(
            behavior.long_poll_resource(base, &ctx),
            Some(ResourceKey::MediaList("queue:uuid:zone-2-vr".into()))
        );
    }

    #[tokio::test]
    async fn zone_media_list_reads_queue() {
        let (ctx, fleet) = context();
        let empty = data(run(&ctx, "/zonecast/data/getZoneMediaList", "id=Office").await.unwrap());
        assert_eq!(empty, json!([]));

        fleet
            .load_container("uuid:zone-2-vr", "0/Albums/1", None)
            .await
            .unwrap();
        let items = data(run(&ctx, "/zonecast/data/getZoneMediaList", "id=Office").await.unwrap());
        assert_eq!(items.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_media_list_is_not_found() {
        let (ctx, _) = context();
        let err = run(&ctx, "/zonecast/data/getMediaList", "id=nope").await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));

        let list = data(run(&ctx, "/zonecast/data/getMediaList", "id=Evening").await.unwrap());
        assert_eq!(list.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn kill_session_reports_existence() {
        let (ctx, _) = context();
        ctx.sessions.touch("s1");

        let first = run(&ctx, "/zonecast/controller/killSession", "sessionId=s1").await.unwrap();
        assert_eq!(first, ActionOutput::Message("Session 's1' was killed!".into()));
        assert!(!ctx.sessions.contains("s1"));

        let second = run(&ctx, "/zonecast/controller/killSession", "sessionId=s1").await.unwrap();
        assert_eq!(second, ActionOutput::Message("Session 's1' does not exist!".into()));
    }
}

//! Queue loading commands.

use async_trait::async_trait;

use super::resolve::required_renderer;
use super::{ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput};
use crate::error::ActionResult;

const OPTION_VALUE: &str = "value";
const OPTION_TRACK_NUMBER: &str = "trackNumber";

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::LoadPlaylist, || Box::new(Load(Source::Playlist)));
    factory.register(ActionKind::LoadContainer, || Box::new(Load(Source::Container)));
    factory.register(ActionKind::LoadUri, || Box::new(Load(Source::Uri)));
    factory.register(ActionKind::LoadShuffle, || Box::new(Load(Source::Shuffle)));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Playlist,
    Container,
    Uri,
    Shuffle,
}

impl Source {
    fn takes_track_number(self) -> bool {
        matches!(self, Self::Playlist | Self::Container)
    }
}

/// Replaces the addressed renderer's queue from a playlist, container or URI.
struct Load(Source);

impl Load {
    fn track_number(&self, base: &ActionBase) -> ActionResult<Option<u32>> {
        if self.0.takes_track_number() {
            base.options().parse_opt(OPTION_TRACK_NUMBER)
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl ActionBehavior for Load {
    fn validate(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<()> {
        base.options().require(OPTION_VALUE)?;
        self.track_number(base)?;
        required_renderer(ctx.backend.as_ref(), base.options()).map(|_| ())
    }

    async fn execute(&self, base: &ActionBase, ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let value = base.options().require(OPTION_VALUE)?;
        let track = self.track_number(base)?;
        let renderer = required_renderer(ctx.backend.as_ref(), base.options())?;

        log::debug!("[Media] Loading {:?} '{}' on {}", self.0, value, renderer);

        match self.0 {
            Source::Playlist => ctx.backend.load_playlist(&renderer, value, track).await?,
            Source::Container => ctx.backend.load_container(&renderer, value, track).await?,
            Source::Uri => ctx.backend.load_uri(&renderer, value).await?,
            Source::Shuffle => ctx.backend.load_shuffle(&renderer, value).await?,
        }
        Ok(ActionOutput::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{context, run};
    use crate::backend::{MediaLibrary, PlayMode, RendererStateSource};
    use crate::error::ActionError;

    #[tokio::test]
    async fn load_container_at_track() {
        let (ctx, fleet) = context();
        let query = "id=Kitchen&value=0%2FAlbums%2F1&trackNumber=2";
        run(&ctx, "/zonecast/controller/loadContainer", query)
            .await
            .unwrap();

        let state = fleet.renderer_state("uuid:zone-1-vr").unwrap();
        assert_eq!(state.track_number, 2);
        assert_eq!(state.current_track.unwrap().title, "Finale");
    }

    #[tokio::test]
    async fn load_uri_queues_single_item() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/loadUri", "id=Office&value=http%3A%2F%2Fradio%2Fstream")
            .await
            .unwrap();

        let queue = fleet.zone_queue_id("uuid:zone-2").unwrap();
        let items = fleet.media_list(&queue).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uri.as_deref(), Some("http://radio/stream"));
    }

    #[tokio::test]
    async fn load_shuffle_sets_play_mode() {
        let (ctx, fleet) = context();
        run(&ctx, "/zonecast/controller/loadShuffle", "id=Office&value=0/Albums/1")
            .await
            .unwrap();
        assert_eq!(
            fleet.renderer_state("uuid:zone-2-vr").unwrap().play_mode,
            PlayMode::Shuffle
        );
    }

    #[tokio::test]
    async fn unknown_playlist_is_rejected_by_backend() {
        let (ctx, _) = context();
        let err = run(&ctx, "/zonecast/controller/loadPlaylist", "id=Office&value=Nope")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Backend(_)));

        let err = run(&ctx, "/zonecast/controller/loadPlaylist", "id=Office")
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }
}

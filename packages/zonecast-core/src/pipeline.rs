//! Per-action execution pipeline.
//!
//! Drives an [`Action`] through `Created -> Parsed -> Validated ->
//! Executing -> Completed | Failed`. Everything below the fatal class is
//! absorbed here and recorded in the action's error log; a fatal error is the
//! only thing returned as `Err`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use crate::action::{Action, ActionContext, ActionOutput, ActionState};
use crate::error::{ActionError, ErrorCode, FatalError};
use crate::protocol_constants::{OPTION_LAST_UPDATE_ID, OPTION_TIMEOUT};
use crate::sync::{parse_last_update_id, wait_for_change, LongPollRequest};

/// Result of running an action that did not crash.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The action ran to completion.
    Completed {
        output: ActionOutput,
        /// Version of the long-polled resource reported to the client.
        update_id: Option<u64>,
    },
    /// Validation or execution failed; details are in the action's error log.
    Failed,
}

/// Validates and executes actions against the shared collaborators.
pub struct ExecutionPipeline {
    ctx: ActionContext,
}

impl ExecutionPipeline {
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub fn context(&self) -> &ActionContext {
        &self.ctx
    }

    /// Parses options and validates the action.
    ///
    /// Idempotent: an already validated (or queued) action passes again, an
    /// already failed one fails again. Never raises; the reason for a failure
    /// is appended to the error log.
    pub fn validate(&self, action: &mut Action) -> bool {
        let (base, behavior) = action.parts_mut();
        match base.state() {
            ActionState::Validated | ActionState::Queued => return true,
            ActionState::Failed => return false,
            _ => {}
        }

        base.parse();
        let result = base.apply_common_options().and_then(|()| {
            if !base.is_sync() && !behavior.is_async_execution_allowed() {
                return Err(ActionError::Validation(format!(
                    "Action '{}' does not allow asynchronous execution!",
                    base.kind()
                )));
            }
            behavior.validate(base, &self.ctx)
        });

        match result {
            Ok(()) => {
                base.set_state(ActionState::Validated);
                true
            }
            Err(err) => {
                base.push_error(err.to_string());
                base.set_state(ActionState::Failed);
                false
            }
        }
    }

    /// Runs the action inline.
    ///
    /// Long-pollable actions first wait for their resource to move past the
    /// client's `lastUpdateId`. After a successful run the post-execution
    /// settle delay is applied.
    pub async fn execute(&self, action: &mut Action) -> Result<Completion, FatalError> {
        if !self.validate(action) {
            return Ok(Completion::Failed);
        }

        let (base, behavior) = action.parts_mut();
        base.set_state(ActionState::Executing);

        let update_id = match behavior.long_poll_resource(base, &self.ctx) {
            Some(resource) => {
                let timeout = base
                    .options()
                    .parse_opt::<u64>(OPTION_TIMEOUT)
                    .ok()
                    .flatten()
                    .map_or(base.long_poll_timeout(), Duration::from_millis);
                let request = LongPollRequest {
                    resource,
                    last_update_id: parse_last_update_id(base.options().get(OPTION_LAST_UPDATE_ID)),
                    interval: base.poll_interval(),
                    timeout,
                };
                let outcome = wait_for_change(self.ctx.backend.as_ref(), &request).await;
                Some(outcome.update_id)
            }
            None => None,
        };

        let started = Instant::now();
        let result = AssertUnwindSafe(behavior.execute(base, &self.ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ActionError::Execution(panic_message(panic.as_ref()))));
        log::debug!(
            "[Pipeline] Request duration: {}ms: {}",
            started.elapsed().as_millis(),
            base.request_info()
        );

        match result {
            Ok(output) => {
                let wait = base.post_execution_wait();
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                base.set_state(ActionState::Completed);
                Ok(Completion::Completed { output, update_id })
            }
            Err(ActionError::Fatal(message)) => {
                base.set_state(ActionState::Failed);
                Err(FatalError {
                    message,
                    request: base.request_info(),
                })
            }
            Err(err) => {
                log::debug!("[Pipeline] {} failed with code {}", base.kind(), err.code());
                base.push_error(err.to_string());
                base.set_state(ActionState::Failed);
                Ok(Completion::Failed)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Unexpected fault: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionBase, ActionBehavior, ActionFactory, ActionKind};
    use crate::backend::{FleetSpec, VirtualFleet};
    use crate::error::ActionResult;
    use crate::state::ActionDefaults;
    use crate::sync::{ResourceKey, SessionRegistry};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn setup(defaults: ActionDefaults) -> (ExecutionPipeline, ActionFactory, VirtualFleet) {
        let fleet = VirtualFleet::new(FleetSpec::demo(), Duration::ZERO).unwrap();
        let ctx = ActionContext::new(Arc::new(fleet.clone()), Arc::new(SessionRegistry::new()));
        (ExecutionPipeline::new(ctx), ActionFactory::new(defaults), fleet)
    }

    struct Panicking;

    #[async_trait]
    impl ActionBehavior for Panicking {
        fn validate(&self, _base: &ActionBase, _ctx: &ActionContext) -> ActionResult<()> {
            Ok(())
        }

        async fn execute(
            &self,
            _base: &ActionBase,
            _ctx: &ActionContext,
        ) -> ActionResult<ActionOutput> {
            panic!("device library blew up");
        }
    }

    #[tokio::test]
    async fn invalid_action_fails_without_executing() {
        let (pipeline, factory, _) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/controller/dropFromZone", Some("id=Garage"))
            .unwrap();

        assert!(!pipeline.validate(&mut action));
        assert_eq!(action.base().state(), ActionState::Failed);
        assert_eq!(action.base().errors(), ["Room with ID 'Garage' not found!"]);

        assert_eq!(pipeline.execute(&mut action).await.unwrap(), Completion::Failed);
        assert_eq!(action.base().errors().len(), 1);
    }

    #[tokio::test]
    async fn returnable_rejects_async() {
        let (pipeline, factory, _) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/data/getZoneConfig", Some("sync=false"))
            .unwrap();
        assert!(!pipeline.validate(&mut action));
        assert!(action.base().error_text().contains("asynchronous"));
    }

    #[tokio::test]
    async fn successful_command_completes() {
        let (pipeline, factory, _) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/controller/play", Some("id=Office"))
            .unwrap();
        let completion = pipeline.execute(&mut action).await.unwrap();
        assert_eq!(
            completion,
            Completion::Completed {
                output: ActionOutput::Done,
                update_id: None
            }
        );
        assert_eq!(action.base().state(), ActionState::Completed);
    }

    #[tokio::test]
    async fn backend_failure_is_absorbed() {
        let (pipeline, factory, fleet) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/controller/play", Some("id=Office"))
            .unwrap();
        assert!(pipeline.validate(&mut action));

        fleet.set_ready(false);
        assert_eq!(pipeline.execute(&mut action).await.unwrap(), Completion::Failed);
        assert!(action.base().error_text().contains("Backend is not available"));
    }

    #[tokio::test]
    async fn fatal_error_escapes() {
        let (pipeline, factory, _) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/controller/crash", Some("level=1"))
            .unwrap();

        let fatal = pipeline.execute(&mut action).await.unwrap_err();
        assert!(fatal.request.starts_with("CRASH / "));
        assert!(action.base().errors().is_empty());
    }

    #[tokio::test]
    async fn panic_is_recoverable_fault() {
        let (pipeline, mut factory, _) = setup(ActionDefaults::default());
        factory.register(ActionKind::Next, || Box::new(Panicking));
        let mut action = factory
            .create_from_path("/zonecast/controller/next", None)
            .unwrap();

        assert_eq!(pipeline.execute(&mut action).await.unwrap(), Completion::Failed);
        assert!(action.base().error_text().contains("device library blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn post_execution_wait_delays_completion() {
        let (pipeline, factory, _) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/controller/play", Some("id=Office&wait=300"))
            .unwrap();

        let started = Instant::now();
        pipeline.execute(&mut action).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_returns_immediately_without_version() {
        let (pipeline, factory, fleet) = setup(ActionDefaults::default());
        fleet.mark_changed(&ResourceKey::ZoneConfig);

        let mut action = factory
            .create_from_path("/zonecast/data/getZoneConfig", None)
            .unwrap();
        let started = Instant::now();
        let completion = pipeline.execute(&mut action).await.unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(matches!(
            completion,
            Completion::Completed { update_id: Some(1), .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_times_out_with_unchanged_version() {
        let (pipeline, factory, _) = setup(ActionDefaults::default());
        let mut action = factory
            .create_from_path("/zonecast/data/getZoneConfig", Some("lastUpdateId=0&timeout=400"))
            .unwrap();

        let started = Instant::now();
        let completion = pipeline.execute(&mut action).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(400));
        assert!(matches!(
            completion,
            Completion::Completed { update_id: Some(0), output: ActionOutput::Data(_) }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn long_poll_wakes_on_change() {
        let (pipeline, factory, fleet) = setup(ActionDefaults::default());
        let writer = fleet.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            writer.mark_changed(&ResourceKey::ZoneConfig);
        });

        let mut action = factory
            .create_from_path("/zonecast/data/getZoneConfig", Some("lastUpdateId=0"))
            .unwrap();
        let started = Instant::now();
        let completion = pipeline.execute(&mut action).await.unwrap();

        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1000));
        assert!(waited < Duration::from_millis(5000));
        assert!(matches!(
            completion,
            Completion::Completed { update_id: Some(1), .. }
        ));
    }
}

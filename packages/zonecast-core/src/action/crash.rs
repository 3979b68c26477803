//! Fault-injection diagnostic.
//!
//! `CRASH` raises the fatal error class on purpose so process supervision and
//! restart behavior can be verified against a live server.

use async_trait::async_trait;

use super::{ActionBase, ActionBehavior, ActionContext, ActionFactory, ActionKind, ActionOutput};
use crate::error::{ActionError, ActionResult};

const OPTION_LEVEL: &str = "level";

pub(crate) fn register(factory: &mut ActionFactory) {
    factory.register(ActionKind::Crash, || Box::new(Crash));
}

struct Crash;

#[async_trait]
impl ActionBehavior for Crash {
    fn validate(&self, _base: &ActionBase, _ctx: &ActionContext) -> ActionResult<()> {
        Ok(())
    }

    async fn execute(&self, base: &ActionBase, _ctx: &ActionContext) -> ActionResult<ActionOutput> {
        let level = base.options().get_or(OPTION_LEVEL, "0");
        Err(ActionError::Fatal(format!(
            "Crash requested by client (level {})",
            level
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::test_support::{context, run};

    #[tokio::test]
    async fn crash_raises_fatal() {
        let (ctx, _) = context();
        let err = run(&ctx, "/zonecast/controller/crash", "level=2").await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("level 2"));
    }
}

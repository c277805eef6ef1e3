use flowsched_core::SchedError;

use crate::context::SchedulingContext;
use crate::passes::ConstraintPass;
use crate::session::ModelSession;

/// A consumer firing starts after every producer firing it takes tokens from has ended.
#[derive(Debug, Default)]
pub struct PrecedencePass;

impl ConstraintPass for PrecedencePass {
    fn name(&self) -> &'static str {
        "precedence"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        for (producer, consumer) in ctx.dependencies() {
            ctx.strategy
                .assert_precedence(ctx, session, producer, consumer)?;
        }
        Ok(())
    }
}

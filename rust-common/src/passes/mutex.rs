use flowsched_core::{ActorInstanceId, SchedError};

use crate::context::SchedulingContext;
use crate::passes::ConstraintPass;
use crate::session::ModelSession;

/// Whether two instances may end up on the same resource at overlapping times.
///
/// They must be distinct and draw from the same resource class. When reachability was
/// computed, instances ordered by a dependency path never overlap and are left out.
pub fn could_conflict(ctx: &SchedulingContext, a: ActorInstanceId, b: ActorInstanceId) -> bool {
    if a == b || !ctx.window(a.actor).same_resources(ctx.window(b.actor)) {
        return false;
    }
    match &ctx.reachability {
        Some(r) => !r.ordered(ctx.idx(a), ctx.idx(b)),
        None => true,
    }
}

/// Unordered pairs needing mutual exclusion, each listed once in instance table order.
pub fn mutex_pairs(ctx: &SchedulingContext) -> Vec<(ActorInstanceId, ActorInstanceId)> {
    let instances: Vec<ActorInstanceId> = ctx.hsdf.instances.iter().map(|(_, i)| i).collect();
    let mut pairs = vec![];
    for (i, a) in instances.iter().enumerate() {
        for b in &instances[i + 1..] {
            if could_conflict(ctx, *a, *b) {
                pairs.push((*a, *b));
            }
        }
    }
    pairs
}

#[derive(Debug, Default)]
pub struct MutualExclusionPass;

impl ConstraintPass for MutualExclusionPass {
    fn name(&self) -> &'static str {
        "mutual-exclusion"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        for (a, b) in mutex_pairs(ctx) {
            ctx.strategy.assert_mutual_exclusion(ctx, session, a, b)?;
        }
        Ok(())
    }
}

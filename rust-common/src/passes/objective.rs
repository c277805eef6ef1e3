use flowsched_core::{ActorKind, SchedError, Term};

use crate::config::ProcessorBudget;
use crate::context::SchedulingContext;
use crate::passes::{visible_end, ConstraintPass};
use crate::session::{GlobalRole, ModelSession, VarKey};

/// Latency of one iteration: the latest visible end among sink instances.
///
/// Its domain starts at the larger of the critical path and the work of the busiest resource
/// class spread over its resources. With a free processor budget the product of latency and
/// processor count also covers the work of every compute class.
#[derive(Debug, Default)]
pub struct ObjectivePass;

impl ConstraintPass for ObjectivePass {
    fn name(&self) -> &'static str {
        "objective"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        let sinks = ctx.hsdf.sinks();
        if sinks.is_empty() {
            return Err(SchedError::NoSinkInstance);
        }
        let mut ends = Vec::with_capacity(sinks.len());
        for sink in sinks {
            ends.push(visible_end(session, sink)?);
        }
        let lower = (ctx.critical_path as i64).max(ctx.work_bound());
        let latency = session.declare_int(
            &ctx.graph,
            VarKey::global(GlobalRole::Latency),
            Some(lower.min(ctx.time_bound())),
            Some(ctx.time_bound()),
        )?;
        session.assert(Term::Var(latency).equals(Term::max(ends)));
        if ctx.config.processors == ProcessorBudget::Free {
            let count = session.term(&VarKey::global(GlobalRole::ProcessorCount))?;
            for (w, work) in ctx.work_per_resource_class() {
                if w.kind == ActorKind::Compute {
                    session.assert(Term::Var(latency).times(count.clone()).ge(work as i64));
                }
            }
        }
        if let Some(omega) = &ctx.omega {
            let deepest = omega.iter().copied().max().unwrap_or(0) as i64;
            let period = session.term(&VarKey::global(GlobalRole::Period))?;
            session.assert(Term::Var(latency).le(period.times(2 * (deepest + 1))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SdfSchedulingProblem;
    use crate::passes::build_model;
    use flowsched_core::{Platform, SdfGraph};

    #[test]
    fn latency_starts_at_the_critical_path() {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 3, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 4, ActorKind::Compute).unwrap();
        let c = g.add_actor("C", 1, ActorKind::Compute).unwrap();
        g.add_channel("ab", a, 1, b, 1, 0).unwrap();
        g.add_channel("ac", a, 1, c, 1, 0).unwrap();
        let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(4));
        let ctx = SchedulingContext::new(&problem, &Default::default()).unwrap();
        let mut session = ModelSession::new();
        build_model(&ctx, &mut session).unwrap();
        let latency = session.var(&VarKey::global(GlobalRole::Latency)).unwrap();
        let decl = session.system().decl(latency);
        assert_eq!((decl.lower, decl.upper), (Some(7), Some(8)));
    }
}

use flowsched_core::{ActorKind, SchedError, Term};

use crate::config::ProcessorBudget;
use crate::context::SchedulingContext;
use crate::passes::ConstraintPass;
use crate::session::{GlobalRole, ModelSession, VarKey};

/// Global variables, then start, end and processor of every instance in topological order.
///
/// At least one compute instance starts at time 0. With a free processor budget, the
/// processor of every compute instance stays below the processor count of its cluster.
#[derive(Debug, Default)]
pub struct TimingPass;

impl ConstraintPass for TimingPass {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        let processor_count = if ctx.config.processors == ProcessorBudget::Free {
            let most = ctx
                .windows
                .iter()
                .filter(|w| w.kind == ActorKind::Compute)
                .map(|w| w.count as i64)
                .max()
                .unwrap_or(1);
            Some(session.declare_int(
                &ctx.graph,
                VarKey::global(GlobalRole::ProcessorCount),
                Some(1),
                Some(most.max(1)),
            )?)
        } else {
            None
        };
        ctx.strategy.declare_globals(ctx, session)?;
        let mut anchors = vec![];
        for inst in ctx.instances_in_order() {
            ctx.strategy.declare_time_variables(ctx, session, inst)?;
            let w = ctx.window(inst.actor);
            if w.kind != ActorKind::Compute {
                continue;
            }
            anchors.push(session.term(&VarKey::start(inst))?.equals(0));
            if let Some(count) = processor_count {
                let cpu = session.term(&VarKey::processor(inst))?;
                session.assert(cpu.minus(w.first as i64).lt(Term::Var(count)));
            }
        }
        if !anchors.is_empty() {
            session.assert(Term::or(anchors));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessorBudget, SchedulingConfigBuilder};
    use crate::models::SdfSchedulingProblem;
    use flowsched_core::{ActorId, ActorInstanceId, Platform, SdfGraph};

    fn chain() -> SdfSchedulingProblem {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 3, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 4, ActorKind::Compute).unwrap();
        g.add_channel("ab", a, 1, b, 2, 0).unwrap();
        SdfSchedulingProblem::new(g, Platform::shared_memory(3))
    }

    #[test]
    fn instances_get_bounded_start_end_and_processor() {
        let ctx = SchedulingContext::new(&chain(), &Default::default()).unwrap();
        let mut session = ModelSession::new();
        TimingPass.apply(&ctx, &mut session).unwrap();
        // two firings of A, one of B, three variables each
        assert_eq!(session.num_vars(), 9);
        let a1 = ActorInstanceId::new(ActorId(0), 1);
        let start = session.var(&VarKey::start(a1)).unwrap();
        let decl = session.system().decl(start);
        assert_eq!(decl.name, "start_A_1");
        assert_eq!((decl.lower, decl.upper), (Some(0), Some(10 - 3)));
        let cpu = session.var(&VarKey::processor(a1)).unwrap();
        let decl = session.system().decl(cpu);
        assert_eq!((decl.lower, decl.upper), (Some(0), Some(2)));
    }

    #[test]
    fn free_budget_declares_the_processor_count() {
        let config = SchedulingConfigBuilder::default()
            .processors(ProcessorBudget::Free)
            .build()
            .unwrap();
        let ctx = SchedulingContext::new(&chain(), &config).unwrap();
        let mut session = ModelSession::new();
        TimingPass.apply(&ctx, &mut session).unwrap();
        let count = session
            .var(&VarKey::global(GlobalRole::ProcessorCount))
            .unwrap();
        let decl = session.system().decl(count);
        assert_eq!((decl.lower, decl.upper), (Some(1), Some(3)));
    }
}

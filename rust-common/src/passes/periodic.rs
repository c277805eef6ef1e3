use flowsched_core::{ActorKind, SchedError};

use crate::config::ProcessorBudget;
use crate::context::SchedulingContext;
use crate::passes::{occupancy, ConstraintPass};
use crate::session::{GlobalRole, InstanceRole, ModelSession, VarKey};

/// Steady-state constraints of a pipelined schedule.
///
/// Folds every instance into the period, then bounds the period from below: no instance
/// occupies its resource for longer than a period, the work of a resource class fits in a
/// period on the resources it may use, and tokens produced `δ` iterations ahead arrive at most
/// `δ` periods late. Fixed durations and fixed resource counts are already covered by the
/// domain of the period.
#[derive(Debug, Default)]
pub struct PeriodicPass;

impl ConstraintPass for PeriodicPass {
    fn name(&self) -> &'static str {
        "periodic"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        let period = session.term(&VarKey::global(GlobalRole::Period))?;
        for inst in ctx.instances_in_order() {
            ctx.strategy.fold_time_variables(ctx, session, inst)?;
            if session
                .try_var(&VarKey::Instance(InstanceRole::TrueEnd, inst))
                .is_some()
            {
                let held = occupancy(ctx, session, inst)?;
                session.assert(period.clone().ge(held));
            }
        }
        for edge in &ctx.hsdf.channels {
            let delta = edge.iteration_distance() as i64;
            if delta == 0 {
                continue;
            }
            let end = session.term(&VarKey::end(edge.source))?;
            let start = session.term(&VarKey::start(edge.target))?;
            session.assert(end.le(start.plus(period.clone().times(delta))));
        }
        if ctx.config.processors == ProcessorBudget::Free {
            let count = session.term(&VarKey::global(GlobalRole::ProcessorCount))?;
            for (w, work) in ctx.work_per_resource_class() {
                if w.kind == ActorKind::Compute {
                    session.assert(period.clone().times(count.clone()).ge(work as i64));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PeriodicFolding, Regime, SchedulingConfigBuilder};
    use crate::models::SdfSchedulingProblem;
    use crate::passes::build_model;
    use flowsched_core::{ActorId, ActorInstanceId, Platform, SdfGraph};

    fn feedback() -> SdfSchedulingProblem {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 2, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 3, ActorKind::Compute).unwrap();
        g.add_channel("ab", a, 1, b, 1, 0).unwrap();
        g.add_channel("ba", b, 1, a, 1, 1).unwrap();
        SdfSchedulingProblem::new(g, Platform::shared_memory(2))
    }

    fn config(folding: PeriodicFolding) -> crate::config::SchedulingConfig {
        SchedulingConfigBuilder::default()
            .regime(Regime::Pipelined)
            .folding(folding)
            .build()
            .unwrap()
    }

    #[test]
    fn period_is_bounded_by_the_largest_duration() {
        let ctx = SchedulingContext::new(&feedback(), &config(PeriodicFolding::Modulo)).unwrap();
        let mut session = ModelSession::new();
        build_model(&ctx, &mut session).unwrap();
        let period = session.var(&VarKey::global(GlobalRole::Period)).unwrap();
        let decl = session.system().decl(period);
        assert_eq!((decl.lower, decl.upper), (Some(3), Some(5)));
    }

    #[test]
    fn starts_may_run_one_period_past_the_total_work() {
        let ctx = SchedulingContext::new(&feedback(), &config(PeriodicFolding::Modulo)).unwrap();
        let mut session = ModelSession::new();
        build_model(&ctx, &mut session).unwrap();
        let b = ActorInstanceId::new(ActorId(1), 0);
        let start = session.var(&VarKey::start(b)).unwrap();
        let decl = session.system().decl(start);
        assert_eq!(decl.upper, Some(2 * 5 - 3));
        let k_end = session
            .var(&VarKey::Instance(InstanceRole::KEnd, b))
            .unwrap();
        assert_eq!(session.system().decl(k_end).upper, Some(ctx.max_offset() + 1));
    }

    #[test]
    fn every_folding_declares_prime_start_times() {
        for folding in [
            PeriodicFolding::Modulo,
            PeriodicFolding::TypeSplit,
            PeriodicFolding::Omega,
        ] {
            let ctx = SchedulingContext::new(&feedback(), &config(folding)).unwrap();
            let mut session = ModelSession::new();
            build_model(&ctx, &mut session).unwrap();
            let b = ActorInstanceId::new(ActorId(1), 0);
            assert!(session
                .try_var(&VarKey::Instance(InstanceRole::StartPrime, b))
                .is_some());
            assert_eq!(
                session
                    .try_var(&VarKey::Instance(InstanceRole::Wrap, b))
                    .is_some(),
                folding != PeriodicFolding::Modulo
            );
        }
    }
}

use std::collections::HashMap;

use flowsched_core::{ActorInstanceId, SchedError, Term};

use crate::context::SchedulingContext;
use crate::passes::ConstraintPass;
use crate::session::{InstanceRole, ModelSession, VarKey};

/// Removes schedules that only differ by a permutation of firings or of processors.
///
/// Firings of one actor start in index order. Within each resource class, instances visited
/// in topological order may only use a resource already used or the next unused one: the
/// first is pinned to the first resource, every next one stays at most one above the running
/// maximum of the indices before it.
#[derive(Debug, Default)]
pub struct SymmetryPass;

impl SymmetryPass {
    fn task_symmetry(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
    ) -> Result<(), SchedError> {
        for (a, _) in ctx.graph.actors() {
            let firings = ctx.hsdf.instances.of_actor(a);
            for pair in firings.windows(2) {
                let earlier = session.term(&VarKey::start(pair[0]))?;
                let later = session.term(&VarKey::start(pair[1]))?;
                session.assert(earlier.le(later));
            }
        }
        Ok(())
    }

    fn processor_symmetry(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
    ) -> Result<(), SchedError> {
        let mut previous: HashMap<_, ActorInstanceId> = HashMap::new();
        for inst in ctx.instances_in_order() {
            let w = *ctx.window(inst.actor);
            let cpu = session.term(&VarKey::processor(inst))?;
            let running = session.declare_int(
                &ctx.graph,
                VarKey::Instance(InstanceRole::MaxProcessor, inst),
                Some(w.first as i64),
                Some(w.last() as i64),
            )?;
            match previous.insert((w.kind, w.cluster), inst) {
                None => {
                    session.assert(cpu.clone().equals(w.first as i64));
                    session.assert(Term::Var(running).equals(cpu));
                }
                Some(before) => {
                    let max_before =
                        session.term(&VarKey::Instance(InstanceRole::MaxProcessor, before))?;
                    session.assert(cpu.clone().le(max_before.clone().plus(1)));
                    session.assert(Term::Var(running).equals(Term::max(vec![cpu, max_before])));
                }
            }
        }
        Ok(())
    }
}

impl ConstraintPass for SymmetryPass {
    fn name(&self) -> &'static str {
        "symmetry"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        if ctx.config.task_symmetry {
            self.task_symmetry(ctx, session)?;
        }
        if ctx.config.processor_symmetry {
            self.processor_symmetry(ctx, session)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SdfSchedulingProblem;
    use crate::passes::TimingPass;
    use flowsched_core::{ActorId, ActorKind, Assignment, Literal, Platform, SdfGraph};

    fn independent() -> SchedulingContext {
        let mut g = SdfGraph::new();
        g.add_actor("A", 5, ActorKind::Compute).unwrap();
        g.add_actor("B", 5, ActorKind::Compute).unwrap();
        let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(3));
        SchedulingContext::new(&problem, &Default::default()).unwrap()
    }

    #[test]
    fn processor_indices_are_packed() {
        let ctx = independent();
        let mut session = ModelSession::new();
        TimingPass.apply(&ctx, &mut session).unwrap();
        SymmetryPass.apply(&ctx, &mut session).unwrap();
        let a = ActorInstanceId::new(ActorId(0), 0);
        let b = ActorInstanceId::new(ActorId(1), 0);
        let (first, second) = {
            let order: Vec<_> = ctx.instances_in_order().collect();
            (order[0], order[1])
        };
        let eval = |cpus: (i64, i64)| {
            let mut m = Assignment::with_capacity(session.num_vars());
            let set = |m: &mut Assignment, key: VarKey, v: i64| {
                m.set(session.var(&key).unwrap(), Literal::Int(v))
            };
            set(&mut m, VarKey::start(a), 0);
            set(&mut m, VarKey::end(a), 5);
            set(&mut m, VarKey::start(b), 0);
            set(&mut m, VarKey::end(b), 5);
            set(&mut m, VarKey::processor(first), cpus.0);
            set(&mut m, VarKey::processor(second), cpus.1);
            let running = |i| VarKey::Instance(InstanceRole::MaxProcessor, i);
            set(&mut m, running(first), cpus.0);
            set(&mut m, running(second), cpus.0.max(cpus.1));
            session.system().is_satisfied_by(&|v| m.value(v))
        };
        assert!(eval((0, 1)));
        assert!(eval((0, 0)));
        assert!(!eval((0, 2)));
        assert!(!eval((1, 0)));
    }
}

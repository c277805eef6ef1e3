//! Constraint generation, one pass per concern.
//!
//! A model is built by running [standard_passes] in order over a fresh [ModelSession]. Passes
//! only read the [SchedulingContext]; everything they create lives in the session.
pub mod buffer;
pub mod dependencies;
pub mod mutex;
pub mod objective;
pub mod periodic;
pub mod symmetry;
pub mod timing;

use flowsched_core::{ActorInstanceId, SchedError, Term};
use log::debug;

use crate::cluster::DmaPass;
use crate::config::Objective;
use crate::context::SchedulingContext;
use crate::session::{GlobalRole, InstanceRole, ModelSession, VarKey};

pub use buffer::BufferPass;
pub use dependencies::PrecedencePass;
pub use mutex::{could_conflict, mutex_pairs, MutualExclusionPass};
pub use objective::ObjectivePass;
pub use periodic::PeriodicPass;
pub use symmetry::SymmetryPass;
pub use timing::TimingPass;

pub trait ConstraintPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError>;
}

/// The passes a context needs, in the order they must run.
pub fn standard_passes(ctx: &SchedulingContext) -> Vec<Box<dyn ConstraintPass>> {
    let mut passes: Vec<Box<dyn ConstraintPass>> = vec![Box::new(TimingPass)];
    if !ctx.dma_links.is_empty() {
        passes.push(Box::new(DmaPass));
    }
    if ctx.config.is_pipelined() {
        passes.push(Box::new(PeriodicPass));
    }
    passes.push(Box::new(PrecedencePass));
    passes.push(Box::new(MutualExclusionPass));
    if ctx.config.task_symmetry || ctx.config.processor_symmetry {
        passes.push(Box::new(SymmetryPass));
    }
    if let Some(encoding) = ctx.config.buffer_analysis {
        passes.push(Box::new(BufferPass { encoding }));
    }
    passes.push(Box::new(ObjectivePass));
    passes
}

/// Resets `session` and fills it with the whole model of `ctx`.
pub fn build_model(ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
    session.reset();
    for pass in standard_passes(ctx) {
        let (vars, assertions) = (session.num_vars(), session.num_assertions());
        pass.apply(ctx, session)?;
        debug!(
            "pass {}: {} variables, {} assertions",
            pass.name(),
            session.num_vars() - vars,
            session.num_assertions() - assertions
        );
    }
    debug!(
        "{} model: {} variables, {} assertions",
        ctx.strategy.name(),
        session.num_vars(),
        session.num_assertions()
    );
    Ok(())
}

/// Time at which an instance stops holding its resource: the true completion when it issues
/// DMA transfers, its end otherwise.
pub fn visible_end(session: &ModelSession, inst: ActorInstanceId) -> Result<Term, SchedError> {
    match session.try_var(&VarKey::Instance(InstanceRole::TrueEnd, inst)) {
        Some(v) => Ok(Term::Var(v)),
        None => session.term(&VarKey::end(inst)),
    }
}

/// How long an instance holds its resource.
pub fn occupancy(
    ctx: &SchedulingContext,
    session: &ModelSession,
    inst: ActorInstanceId,
) -> Result<Term, SchedError> {
    match session.try_var(&VarKey::Instance(InstanceRole::TrueEnd, inst)) {
        Some(v) => Ok(Term::Var(v).minus(session.term(&VarKey::start(inst))?)),
        None => Ok(Term::int(ctx.duration(inst.actor))),
    }
}

/// Variable minimised by exploration for the configured objective.
pub fn objective_key(ctx: &SchedulingContext) -> VarKey {
    VarKey::global(match ctx.config.objective {
        Objective::Latency => GlobalRole::Latency,
        Objective::Period => GlobalRole::Period,
        Objective::ProcessorCount => GlobalRole::ProcessorCount,
        Objective::TotalBuffer => GlobalRole::TotalBuffer,
    })
}

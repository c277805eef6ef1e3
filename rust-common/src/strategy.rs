use flowsched_core::{ActorInstanceId, SchedError, Term};

use crate::config::{PeriodicFolding, SchedulingConfig};
use crate::context::SchedulingContext;
use crate::passes::{occupancy, visible_end};
use crate::session::{GlobalRole, InstanceRole, ModelSession, VarKey};

/// Regime-specific part of the model: which time variables an instance has and how two
/// instances sharing a resource are kept apart.
///
/// The passes call into the strategy of the context, so the non-pipelined and pipelined
/// models share every other constraint.
pub trait SchedulingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn declare_globals(
        &self,
        _ctx: &SchedulingContext,
        _session: &mut ModelSession,
    ) -> Result<(), SchedError> {
        Ok(())
    }

    /// Start, end and processor of one instance.
    fn declare_time_variables(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        inst: ActorInstanceId,
    ) -> Result<(), SchedError> {
        let dur = ctx.duration(inst.actor);
        let start = session.declare_int(
            &ctx.graph,
            VarKey::start(inst),
            Some(0),
            Some(ctx.time_bound() - dur),
        )?;
        let end = session.declare_int(
            &ctx.graph,
            VarKey::end(inst),
            Some(dur),
            Some(ctx.time_bound()),
        )?;
        session.assert(Term::Var(end).equals(Term::Var(start).plus(dur)));
        let w = ctx.window(inst.actor);
        session.declare_int(
            &ctx.graph,
            VarKey::processor(inst),
            Some(w.first as i64),
            Some(w.last() as i64),
        )?;
        Ok(())
    }

    /// Variables that place an instance inside the period, once its visible end is known.
    fn fold_time_variables(
        &self,
        _ctx: &SchedulingContext,
        _session: &mut ModelSession,
        _inst: ActorInstanceId,
    ) -> Result<(), SchedError> {
        Ok(())
    }

    fn assert_precedence(
        &self,
        _ctx: &SchedulingContext,
        session: &mut ModelSession,
        producer: ActorInstanceId,
        consumer: ActorInstanceId,
    ) -> Result<(), SchedError> {
        let end = session.term(&VarKey::end(producer))?;
        let start = session.term(&VarKey::start(consumer))?;
        session.assert(start.ge(end));
        Ok(())
    }

    fn assert_mutual_exclusion(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        a: ActorInstanceId,
        b: ActorInstanceId,
    ) -> Result<(), SchedError>;
}

pub fn strategy_for(config: &SchedulingConfig) -> Box<dyn SchedulingStrategy> {
    if config.is_pipelined() {
        Box::new(Pipelined {
            folding: config.folding,
        })
    } else {
        Box::new(NonPipelined)
    }
}

fn same_resource(session: &ModelSession, a: ActorInstanceId, b: ActorInstanceId) -> Result<Term, SchedError> {
    Ok(session
        .term(&VarKey::processor(a))?
        .equals(session.term(&VarKey::processor(b))?))
}

/// One iteration scheduled in isolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonPipelined;

impl SchedulingStrategy for NonPipelined {
    fn name(&self) -> &'static str {
        "non-pipelined"
    }

    fn assert_mutual_exclusion(
        &self,
        _ctx: &SchedulingContext,
        session: &mut ModelSession,
        a: ActorInstanceId,
        b: ActorInstanceId,
    ) -> Result<(), SchedError> {
        let shared = same_resource(session, a, b)?;
        let (sa, sb) = (
            session.term(&VarKey::start(a))?,
            session.term(&VarKey::start(b))?,
        );
        let (ea, eb) = (visible_end(session, a)?, visible_end(session, b)?);
        session.assert(shared.implies(Term::or(vec![sa.ge(eb), sb.ge(ea)])));
        Ok(())
    }
}

/// Steady state where consecutive iterations overlap, one iteration starting every period.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipelined {
    pub folding: PeriodicFolding,
}

impl Pipelined {
    fn max_offset_of(&self, ctx: &SchedulingContext, inst: ActorInstanceId) -> i64 {
        let bound = ctx.max_offset();
        match (self.folding, &ctx.omega) {
            (PeriodicFolding::Omega, Some(omega)) => {
                bound.min(2 * (omega[ctx.idx(inst)] as i64 + 1) - 1)
            }
            _ => bound,
        }
    }

    /// `K = t div P`, `t' = t - K·P`, with `K ≤ KMax + spill`.
    ///
    /// Ends take a spill of one: an occupation no longer than a period that starts in the last
    /// period may finish in the next one.
    fn fold_by_division(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        time: Term,
        spill: i64,
        k_key: VarKey,
        prime_key: VarKey,
    ) -> Result<(), SchedError> {
        let period = session.term(&VarKey::global(GlobalRole::Period))?;
        let k_max = session.term(&VarKey::global(GlobalRole::KMax))?;
        let k = session.declare_int(&ctx.graph, k_key, Some(0), Some(ctx.max_offset() + spill))?;
        let prime = session.declare_int(&ctx.graph, prime_key, Some(0), Some(ctx.horizon))?;
        session.assert(Term::Var(k).equals(time.clone().div(period.clone())));
        session.assert(Term::Var(prime).equals(time.minus(Term::Var(k).times(period))));
        session.assert(Term::Var(k).le(k_max.plus(spill)));
        Ok(())
    }

    /// Bounded K chosen by case analysis, then the wrap flag and end inside the period.
    fn fold_by_cases(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        inst: ActorInstanceId,
    ) -> Result<(), SchedError> {
        let period = session.term(&VarKey::global(GlobalRole::Period))?;
        let k_max = session.term(&VarKey::global(GlobalRole::KMax))?;
        let start = session.term(&VarKey::start(inst))?;
        let bound = self.max_offset_of(ctx, inst);
        let k = session.declare_int(
            &ctx.graph,
            VarKey::Instance(InstanceRole::KStart, inst),
            Some(0),
            Some(bound),
        )?;
        session.assert(Term::Var(k).le(k_max));
        let mut offset = Term::int(0);
        for i in (0..=bound).rev() {
            let selected = Term::Var(k).equals(i);
            session.assert(selected.clone().implies(Term::and(vec![
                start.clone().ge(period.clone().times(i)),
                start.clone().lt(period.clone().times(i + 1)),
            ])));
            if i > 0 {
                offset = Term::ite(selected, period.clone().times(i), offset);
            }
        }
        let s_prime = session.declare_int(
            &ctx.graph,
            VarKey::Instance(InstanceRole::StartPrime, inst),
            Some(0),
            Some(ctx.horizon),
        )?;
        session.assert(Term::Var(s_prime).equals(start.minus(offset)));
        let reach = Term::Var(s_prime).plus(occupancy(ctx, session, inst)?);
        let wrap = session.declare_bool(&ctx.graph, VarKey::Instance(InstanceRole::Wrap, inst))?;
        session.assert(Term::Var(wrap).equals(reach.clone().gt(period.clone())));
        let e_prime = session.declare_int(
            &ctx.graph,
            VarKey::Instance(InstanceRole::EndPrime, inst),
            Some(0),
            Some(ctx.horizon),
        )?;
        session.assert(Term::Var(e_prime).equals(Term::ite(
            Term::Var(wrap),
            reach.clone().minus(period),
            reach,
        )));
        Ok(())
    }
}

impl SchedulingStrategy for Pipelined {
    fn name(&self) -> &'static str {
        match self.folding {
            PeriodicFolding::Modulo => "pipelined",
            PeriodicFolding::TypeSplit => "pipelined-type-split",
            PeriodicFolding::Omega => "pipelined-omega",
        }
    }

    fn declare_globals(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
    ) -> Result<(), SchedError> {
        let period = session.declare_int(
            &ctx.graph,
            VarKey::global(GlobalRole::Period),
            Some(ctx.period_lower_bound()),
            Some(ctx.horizon),
        )?;
        let k_max = session.declare_int(
            &ctx.graph,
            VarKey::global(GlobalRole::KMax),
            Some(0),
            Some(ctx.max_offset()),
        )?;
        session.assert(Term::Var(k_max).equals(Term::int(ctx.horizon).div(Term::Var(period))));
        Ok(())
    }

    fn fold_time_variables(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        inst: ActorInstanceId,
    ) -> Result<(), SchedError> {
        match self.folding {
            PeriodicFolding::Modulo => {
                let start = session.term(&VarKey::start(inst))?;
                self.fold_by_division(
                    ctx,
                    session,
                    start,
                    0,
                    VarKey::Instance(InstanceRole::KStart, inst),
                    VarKey::Instance(InstanceRole::StartPrime, inst),
                )?;
                let end = visible_end(session, inst)?;
                self.fold_by_division(
                    ctx,
                    session,
                    end,
                    1,
                    VarKey::Instance(InstanceRole::KEnd, inst),
                    VarKey::Instance(InstanceRole::EndPrime, inst),
                )
            }
            PeriodicFolding::TypeSplit | PeriodicFolding::Omega => {
                self.fold_by_cases(ctx, session, inst)
            }
        }
    }

    fn assert_mutual_exclusion(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        a: ActorInstanceId,
        b: ActorInstanceId,
    ) -> Result<(), SchedError> {
        let shared = same_resource(session, a, b)?;
        let period = session.term(&VarKey::global(GlobalRole::Period))?;
        let sa = session.term(&VarKey::Instance(InstanceRole::StartPrime, a))?;
        let sb = session.term(&VarKey::Instance(InstanceRole::StartPrime, b))?;
        let separated = match self.folding {
            PeriodicFolding::Modulo => {
                let (da, db) = (occupancy(ctx, session, a)?, occupancy(ctx, session, b)?);
                Term::and(vec![
                    Term::or(vec![
                        sa.clone().ge(sb.clone().plus(db.clone())),
                        sb.clone().ge(sa.clone().plus(da.clone())),
                    ]),
                    sa.clone().plus(da).le(sb.clone().plus(period.clone())),
                    sb.plus(db).le(sa.plus(period)),
                ])
            }
            PeriodicFolding::TypeSplit | PeriodicFolding::Omega => {
                let ea = session.term(&VarKey::Instance(InstanceRole::EndPrime, a))?;
                let eb = session.term(&VarKey::Instance(InstanceRole::EndPrime, b))?;
                let wa = session.term(&VarKey::Instance(InstanceRole::Wrap, a))?;
                let wb = session.term(&VarKey::Instance(InstanceRole::Wrap, b))?;
                Term::and(vec![
                    Term::and(vec![wa.clone(), wb.clone()]).negate(),
                    Term::and(vec![wa.clone().negate(), wb.clone().negate()]).implies(Term::or(
                        vec![sa.clone().ge(eb.clone()), sb.clone().ge(ea.clone())],
                    )),
                    wa.implies(Term::and(vec![
                        ea.clone().le(sb.clone()),
                        eb.clone().le(sa.clone()),
                    ])),
                    wb.implies(Term::and(vec![eb.le(sa), ea.le(sb)])),
                ])
            }
        };
        session.assert(shared.implies(separated));
        Ok(())
    }
}

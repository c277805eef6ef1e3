use std::{
    cmp::Ordering,
    collections::HashMap,
    time::{Duration, Instant},
};

use derive_builder::Builder;
use flowsched_common::{
    build_model, decode_schedule, objective_key, BufferEncoding, GlobalRole, ModelSession,
    Objective, ProcessorBudget, SchedulingConfig, SchedulingContext, SdfSchedulingProblem, VarKey,
};
use flowsched_core::{
    Assignment, SatResult, SchedError, Schedule, Solver, SolverFactory, Term,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Limits of one exploration.
///
/// Timeouts are in milliseconds, 0 meaning no limit. A query answered unknown is retried
/// `unknown_retries` times, its timeout multiplied by `timeout_growth` each time, before the
/// bound it was testing is abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct ExplorationConfiguration {
    pub query_timeout: u64,
    pub total_timeout: u64,
    pub unknown_retries: u32,
    pub timeout_growth: u32,
    pub max_sols: u64,
}

impl Default for ExplorationConfiguration {
    fn default() -> Self {
        ExplorationConfiguration {
            query_timeout: 0,
            total_timeout: 0,
            unknown_retries: 2,
            timeout_growth: 2,
            max_sols: 10,
        }
    }
}

/// A schedule found by exploration, with the value reached for the minimised variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explored {
    pub schedule: Schedule,
    pub objective: i64,
    /// False when a bound was abandoned after repeated unknown answers.
    pub proven_optimal: bool,
    pub assignment: Assignment,
}

/// One solver instance loaded with the model of one context.
pub struct Explorer<'a> {
    ctx: &'a SchedulingContext,
    session: ModelSession,
    solver: Box<dyn Solver>,
    config: ExplorationConfiguration,
    started: Instant,
    queries: usize,
}

impl<'a> Explorer<'a> {
    pub fn new(
        ctx: &'a SchedulingContext,
        factory: &dyn SolverFactory,
        config: ExplorationConfiguration,
    ) -> Result<Explorer<'a>, SchedError> {
        let mut session = ModelSession::new();
        build_model(ctx, &mut session)?;
        let mut solver = factory.create();
        solver.load(session.system())?;
        debug!(
            "loaded {} variables and {} assertions into {}",
            session.num_vars(),
            session.num_assertions(),
            solver.unique_identifier()
        );
        Ok(Explorer {
            ctx,
            session,
            solver,
            config,
            started: Instant::now(),
            queries: 0,
        })
    }

    pub fn session(&self) -> &ModelSession {
        &self.session
    }

    pub fn queries(&self) -> usize {
        self.queries
    }

    fn remaining(&self) -> Option<Duration> {
        if self.config.total_timeout == 0 {
            return None;
        }
        Some(Duration::from_millis(self.config.total_timeout).saturating_sub(self.started.elapsed()))
    }

    fn query_timeout(&self, attempt: u32) -> Option<Duration> {
        let grown = if self.config.query_timeout == 0 {
            None
        } else {
            let factor = (self.config.timeout_growth.max(1) as u64).saturating_pow(attempt);
            Some(Duration::from_millis(self.config.query_timeout.saturating_mul(factor)))
        };
        match (grown, self.remaining()) {
            (Some(g), Some(r)) => Some(g.min(r)),
            (g, r) => g.or(r),
        }
    }

    /// Checks the model under `bounds`, retrying unknown answers with growing timeouts.
    pub fn query(&mut self, bounds: &[Term]) -> Result<(SatResult, Option<Assignment>), SchedError> {
        self.solver.push();
        let outcome = self.scoped_query(bounds);
        self.solver.pop();
        outcome
    }

    fn scoped_query(&mut self, bounds: &[Term]) -> Result<(SatResult, Option<Assignment>), SchedError> {
        for b in bounds {
            self.solver.assert(b.clone())?;
        }
        let mut verdict = SatResult::Unknown;
        for attempt in 0..=self.config.unknown_retries {
            if self.remaining() == Some(Duration::ZERO) {
                break;
            }
            verdict = self.solver.check_sat(self.query_timeout(attempt))?;
            self.queries += 1;
            if verdict != SatResult::Unknown || self.config.query_timeout == 0 {
                break;
            }
            debug!("query {} answered unknown, retrying", self.queries);
        }
        let model = match verdict {
            SatResult::Sat => Some(self.solver.model()?),
            _ => None,
        };
        Ok((verdict, model))
    }

    pub fn feasible(&mut self) -> Result<Option<Schedule>, SchedError> {
        match self.query(&[])? {
            (SatResult::Sat, Some(a)) => Ok(Some(decode_schedule(self.ctx, &self.session, &a)?)),
            _ => Ok(None),
        }
    }

    /// Smallest value of `key` under `scoped`, by binary search between its declared lower
    /// bound and the best value found so far.
    pub fn minimize(&mut self, key: &VarKey, scoped: &[Term]) -> Result<Option<Explored>, SchedError> {
        let v = self.session.var(key)?;
        let name = self.session.system().decl(v).name.clone();
        let mut best = match self.query(scoped)? {
            (SatResult::Sat, Some(a)) => a,
            (SatResult::Unsat, _) => {
                debug!("no schedule satisfies the bounds while minimising {}", name);
                return Ok(None);
            }
            _ => {
                warn!("no schedule found within the time limits while minimising {}", name);
                return Ok(None);
            }
        };
        let mut hi = self.session.value(&best, key)?;
        let mut lo = self.session.system().decl(v).lower.unwrap_or(hi).min(hi);
        let mut proven = true;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mut bounds = scoped.to_vec();
            bounds.push(Term::Var(v).le(mid));
            match self.query(&bounds)? {
                (SatResult::Sat, Some(a)) => {
                    hi = self.session.value(&a, key)?;
                    best = a;
                }
                (SatResult::Unsat, _) => lo = mid + 1,
                _ => {
                    warn!(
                        "abandoning the bound {} <= {} after {} unknown answers",
                        name,
                        mid,
                        self.config.unknown_retries + 1
                    );
                    proven = false;
                    break;
                }
            }
            debug!("{} in [{}, {}]", name, lo, hi);
        }
        info!(
            "{} = {}{} after {} queries",
            name,
            hi,
            if proven { "" } else { " (not proven optimal)" },
            self.queries
        );
        Ok(Some(Explored {
            schedule: decode_schedule(self.ctx, &self.session, &best)?,
            objective: hi,
            proven_optimal: proven,
            assignment: best,
        }))
    }
}

/// Minimises the configured objective.
pub fn optimize(
    problem: &SdfSchedulingProblem,
    config: &SchedulingConfig,
    factory: &dyn SolverFactory,
    exploration: &ExplorationConfiguration,
) -> Result<Option<Explored>, SchedError> {
    let ctx = SchedulingContext::new(problem, config)?;
    let mut explorer = Explorer::new(&ctx, factory, exploration.clone())?;
    explorer.minimize(&objective_key(&ctx), &[])
}

/// Minimises the configured objective, then the processors used with every start time
/// pinned to the first schedule. The first schedule is kept when the second phase fails.
pub fn refine_processors(
    problem: &SdfSchedulingProblem,
    config: &SchedulingConfig,
    factory: &dyn SolverFactory,
    exploration: &ExplorationConfiguration,
) -> Result<Option<Explored>, SchedError> {
    let ctx = SchedulingContext::new(problem, config)?;
    let mut first = Explorer::new(&ctx, factory, exploration.clone())?;
    let objective = objective_key(&ctx);
    let phase1 = match first.minimize(&objective, &[])? {
        Some(e) => e,
        None => return Ok(None),
    };
    let mut reduced = ctx.config.clone();
    reduced.processors = ProcessorBudget::Free;
    reduced.objective = Objective::ProcessorCount;
    let refined = SchedulingContext::new(problem, &reduced).and_then(|ctx2| {
        let mut second = Explorer::new(&ctx2, factory, exploration.clone())?;
        let mut pins = vec![];
        for (_, inst) in ctx.hsdf.instances.iter() {
            let start = first.session().value(&phase1.assignment, &VarKey::start(inst))?;
            pins.push(second.session().term(&VarKey::start(inst))?.equals(start));
        }
        if let Some(v) = second.session().try_var(&objective) {
            pins.push(Term::Var(v).le(phase1.objective));
        }
        second.minimize(&VarKey::global(GlobalRole::ProcessorCount), &pins)
    });
    match refined {
        Ok(Some(e)) => {
            info!(
                "refinement uses {} processors",
                e.schedule.processor_count.unwrap_or(e.objective)
            );
            Ok(Some(e))
        }
        Ok(None) => {
            warn!("refinement found no schedule, keeping the first one");
            Ok(Some(phase1))
        }
        Err(err) => {
            warn!("refinement failed ({}), keeping the first schedule", err);
            Ok(Some(phase1))
        }
    }
}

/// Latency and total buffer trade-offs, fastest first.
///
/// Each step finds the smallest latency among schedules with less buffering than the
/// previous point, then the smallest buffering at that latency.
pub fn pareto_latency_buffer(
    problem: &SdfSchedulingProblem,
    config: &SchedulingConfig,
    factory: &dyn SolverFactory,
    exploration: &ExplorationConfiguration,
) -> Result<Vec<Explored>, SchedError> {
    let mut config = config.clone();
    config.objective = Objective::Latency;
    if config.buffer_analysis.is_none() {
        config.buffer_analysis = Some(BufferEncoding::CaseSplit);
    }
    let ctx = SchedulingContext::new(problem, &config)?;
    let mut explorer = Explorer::new(&ctx, factory, exploration.clone())?;
    let latency = VarKey::global(GlobalRole::Latency);
    let total = VarKey::global(GlobalRole::TotalBuffer);
    let (latency_t, total_t) = (explorer.session().term(&latency)?, explorer.session().term(&total)?);
    let mut front: Vec<Explored> = vec![];
    let mut buffer_cap: Option<i64> = None;
    while (front.len() as u64) < exploration.max_sols.max(1) {
        let mut scoped = vec![];
        if let Some(cap) = buffer_cap {
            scoped.push(total_t.clone().lt(cap));
        }
        let fastest = match explorer.minimize(&latency, &scoped)? {
            Some(e) => e,
            None => break,
        };
        scoped.push(latency_t.clone().le(fastest.objective));
        let leanest = explorer.minimize(&total, &scoped)?.unwrap_or(fastest);
        buffer_cap = leanest.schedule.total_buffer;
        info!(
            "pareto point: latency {:?}, buffer {:?}",
            leanest.schedule.latency, leanest.schedule.total_buffer
        );
        front.push(leanest);
        if buffer_cap.is_none() {
            break;
        }
    }
    Ok(compute_pareto_solutions(front))
}

/// Optimises once per processor budget in `counts`, in parallel, keeping the non-dominated
/// results.
pub fn sweep_processors(
    problem: &SdfSchedulingProblem,
    config: &SchedulingConfig,
    factory: &dyn SolverFactory,
    exploration: &ExplorationConfiguration,
    counts: &[u32],
) -> Result<Vec<Explored>, SchedError> {
    let results: Vec<Result<Option<Explored>, SchedError>> = counts
        .par_iter()
        .map(|n| {
            let mut c = config.clone();
            c.processors = ProcessorBudget::Fixed(*n);
            if c.objective == Objective::ProcessorCount {
                c.objective = Objective::Latency;
            }
            optimize(problem, &c, factory, exploration)
        })
        .collect();
    let mut found = vec![];
    for r in results {
        if let Some(e) = r? {
            found.push(e);
        }
    }
    Ok(compute_pareto_solutions(found))
}

/// Keeps the solutions no other one dominates, dropping duplicates of the same objectives.
pub fn compute_pareto_solutions(sols: Vec<Explored>) -> Vec<Explored> {
    let objs: Vec<HashMap<String, f64>> = sols.iter().map(|s| s.schedule.objectives()).collect();
    sols.into_iter()
        .enumerate()
        .filter(|(i, _)| {
            objs.iter().enumerate().all(|(j, other)| match pareto_dominance_partial_cmp(other, &objs[*i]) {
                Some(Ordering::Less) => false,
                Some(Ordering::Equal) => j >= *i,
                _ => true,
            })
        })
        .map(|(_, s)| s)
        .collect()
}

/// `Less` when `lhs` is nowhere worse and somewhere better than `rhs`; `None` when they
/// trade off or cover different objectives.
pub fn pareto_dominance_partial_cmp(
    lhs: &HashMap<String, f64>,
    rhs: &HashMap<String, f64>,
) -> Option<Ordering> {
    if lhs.len() != rhs.len() || !lhs.keys().all(|k| rhs.contains_key(k)) {
        return None;
    }
    let mut ordering = Ordering::Equal;
    for (k, v) in lhs {
        let w = rhs.get(k)?;
        match (v.partial_cmp(w)?, ordering) {
            (Ordering::Equal, _) => {}
            (o, Ordering::Equal) => ordering = o,
            (o, current) if o == current => {}
            _ => return None,
        }
    }
    Some(ordering)
}

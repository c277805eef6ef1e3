use flowsched_bridge_native::NativeSolver;
use flowsched_common::{
    build_model, decode_schedule, GlobalRole, ModelSession, SchedulingConfig, SchedulingContext,
    SdfSchedulingProblem, VarKey,
};
use flowsched_core::{
    ActorKind, ConstraintSystem, Platform, SatResult, SdfGraph, Solver, Term,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn verdicts_agree_with_enumeration(
        ux in 0i64..6,
        uy in 0i64..6,
        cx in -3i64..4,
        cy in -3i64..4,
        k in -5i64..15,
    ) {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(ux));
        let y = sys.declare_int("y", Some(0), Some(uy));
        sys.assert(Term::Var(x).times(cx).plus(Term::Var(y).times(cy)).le(k));
        sys.assert(Term::distinct(vec![Term::Var(x), Term::Var(y)]));
        let expected = (0..=ux).any(|a| (0..=uy).any(|b| a * cx + b * cy <= k && a != b));
        let mut solver = NativeSolver::default();
        solver.load(&sys).unwrap();
        let verdict = solver.check_sat(None).unwrap();
        prop_assert_eq!(verdict == SatResult::Sat, expected);
        if expected {
            let m = solver.model().unwrap();
            prop_assert!(sys.is_satisfied_by(&|v| m.value(v)));
        }
    }
}

#[test]
fn fork_latency_is_minimal_on_two_processors() {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 3, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 4, ActorKind::Compute).unwrap();
    let c = g.add_actor("C", 1, ActorKind::Compute).unwrap();
    g.add_channel("ab", a, 1, b, 1, 0).unwrap();
    g.add_channel("ac", a, 1, c, 1, 0).unwrap();
    let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(2));
    let ctx = SchedulingContext::new(&problem, &SchedulingConfig::default()).unwrap();
    let mut session = ModelSession::new();
    build_model(&ctx, &mut session).unwrap();
    let latency = session.var(&VarKey::global(GlobalRole::Latency)).unwrap();
    let mut solver = NativeSolver::default();
    solver.load(session.system()).unwrap();
    solver.push();
    solver.assert(Term::Var(latency).le(7)).unwrap();
    assert_eq!(solver.check_sat(None).unwrap(), SatResult::Sat);
    let schedule = decode_schedule(&ctx, &session, &solver.model().unwrap()).unwrap();
    assert_eq!(schedule.latency, Some(7));
    assert_eq!(schedule.firing("B", 0).unwrap().start_time, 3);
    let c_start = schedule.firing("C", 0).unwrap().start_time;
    assert!((3..=6).contains(&c_start));
}

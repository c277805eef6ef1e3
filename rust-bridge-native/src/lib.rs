//! In-process backtracking backend for small models.
//!
//! It needs no external tool, which makes it the default for tests and small problems. Every
//! decision variable must have a finite domain, either declared or implied by a unit bound;
//! variables fixed by an equality (`x = term`) are computed instead of enumerated.
pub mod domains;
pub mod search;

use std::time::Duration;

use flowsched_core::{
    AssertionStack, Assignment, ConstraintSystem, Literal, SatResult, Solver, SolverError,
    SolverFactory, Sort, Term, VarId,
};
use log::debug;

use crate::domains::{declared_domains, find_definitions, tighten_unit_bounds};
use crate::search::{Outcome, Search};

pub const DEFAULT_NODE_LIMIT: u64 = 5_000_000;

#[derive(Debug, Clone)]
pub struct NativeSolver {
    node_limit: Option<u64>,
    system: ConstraintSystem,
    stack: AssertionStack,
    last_model: Option<Assignment>,
}

impl NativeSolver {
    pub fn new(node_limit: Option<u64>) -> NativeSolver {
        NativeSolver {
            node_limit,
            system: ConstraintSystem::new(),
            stack: AssertionStack::default(),
            last_model: None,
        }
    }
}

impl Default for NativeSolver {
    fn default() -> Self {
        NativeSolver::new(Some(DEFAULT_NODE_LIMIT))
    }
}

impl Solver for NativeSolver {
    fn unique_identifier(&self) -> String {
        "NativeSolver".to_string()
    }

    fn load(&mut self, system: &ConstraintSystem) -> Result<(), SolverError> {
        self.reset();
        self.system = system.clone();
        Ok(())
    }

    fn push(&mut self) {
        self.stack.push();
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    fn assert(&mut self, term: Term) -> Result<(), SolverError> {
        if let Some(v) = term.vars().into_iter().find(|v| v.index() >= self.system.num_vars()) {
            return Err(SolverError::Protocol(format!(
                "variable #{} is not declared",
                v.index()
            )));
        }
        self.stack.assert(term);
        Ok(())
    }

    fn reset(&mut self) {
        self.system.clear();
        self.stack.clear();
        self.last_model = None;
    }

    fn check_sat(&mut self, timeout: Option<Duration>) -> Result<SatResult, SolverError> {
        self.last_model = None;
        let terms: Vec<&Term> = self
            .system
            .assertions()
            .iter()
            .chain(self.stack.terms())
            .collect();
        let mut domains = declared_domains(&self.system);
        for t in &terms {
            tighten_unit_bounds(&mut domains, t);
        }
        let definitions = find_definitions(domains.len(), &terms);
        let mut search = Search::new(&domains, terms, &definitions)?
            .with_limits(self.node_limit, timeout);
        let outcome = search.run();
        debug!(
            "native search over {} variables: {:?} after {} nodes",
            domains.len(),
            outcome,
            search.nodes()
        );
        match outcome {
            Outcome::Found => {
                let mut model = Assignment::with_capacity(domains.len());
                for (i, (value, decl)) in search.values().iter().zip(self.system.decls()).enumerate() {
                    let v = value.unwrap_or(0);
                    let literal = match decl.sort {
                        Sort::Bool => Literal::Bool(v != 0),
                        Sort::Int => Literal::Int(v),
                    };
                    model.set(VarId(i as u32), literal);
                }
                self.last_model = Some(model);
                Ok(SatResult::Sat)
            }
            Outcome::Exhausted => Ok(SatResult::Unsat),
            Outcome::LimitReached => Ok(SatResult::Unknown),
        }
    }

    fn model(&self) -> Result<Assignment, SolverError> {
        self.last_model.clone().ok_or(SolverError::NoModel)
    }
}

pub struct NativeFactory {
    pub node_limit: Option<u64>,
}

impl Default for NativeFactory {
    fn default() -> Self {
        NativeFactory {
            node_limit: Some(DEFAULT_NODE_LIMIT),
        }
    }
}

impl SolverFactory for NativeFactory {
    fn unique_identifier(&self) -> String {
        "NativeFactory".to_string()
    }

    fn create(&self) -> Box<dyn Solver> {
        Box::new(NativeSolver::new(self.node_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_solution_is_found_first() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(9));
        let y = sys.declare_int("y", Some(0), Some(9));
        let s = sys.declare_int("s", None, None);
        sys.assert(Term::Var(s).equals(Term::Var(x).plus(Term::Var(y))));
        sys.assert(Term::Var(s).ge(5));
        sys.assert(Term::Var(x).gt(Term::Var(y)));
        let mut solver = NativeSolver::default();
        solver.load(&sys).unwrap();
        assert_eq!(solver.check_sat(None).unwrap(), SatResult::Sat);
        let m = solver.model().unwrap();
        assert_eq!((m.value(x), m.value(y), m.value(s)), (Some(3), Some(2), Some(5)));
        assert!(sys.is_satisfied_by(&|v| m.value(v)));
    }

    #[test]
    fn scoped_bounds_can_make_the_model_unsatisfiable() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(4));
        let b = sys.declare_bool("b");
        sys.assert(Term::Var(b).equals(Term::Var(x).ge(3)));
        sys.assert(Term::Var(b));
        let mut solver = NativeSolver::default();
        solver.load(&sys).unwrap();
        solver.push();
        solver.assert(Term::Var(x).le(2)).unwrap();
        assert_eq!(solver.check_sat(None).unwrap(), SatResult::Unsat);
        assert_eq!(solver.model(), Err(SolverError::NoModel));
        solver.pop();
        assert_eq!(solver.check_sat(None).unwrap(), SatResult::Sat);
        let m = solver.model().unwrap();
        assert_eq!(m.get(b), Some(Literal::Bool(true)));
        assert_eq!(m.value(x), Some(3));
    }

    #[test]
    fn node_limit_gives_unknown() {
        let mut sys = ConstraintSystem::new();
        let vars: Vec<VarId> = (0..6)
            .map(|i| sys.declare_int(&format!("x{}", i), Some(0), Some(5)))
            .collect();
        // pigeonhole: six distinct values below five
        sys.assert(Term::distinct(vars.iter().map(|v| Term::Var(*v)).collect()));
        for v in &vars {
            sys.assert(Term::Var(*v).lt(5));
        }
        let mut solver = NativeSolver::new(Some(10));
        solver.load(&sys).unwrap();
        assert_eq!(solver.check_sat(None).unwrap(), SatResult::Unknown);
        let mut solver = NativeSolver::new(None);
        solver.load(&sys).unwrap();
        assert_eq!(solver.check_sat(None).unwrap(), SatResult::Unsat);
    }

    #[test]
    fn unbounded_decisions_are_unsupported() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", None, None);
        let y = sys.declare_int("y", Some(0), Some(3));
        sys.assert(Term::Var(x).gt(Term::Var(y)));
        let mut solver = NativeSolver::default();
        solver.load(&sys).unwrap();
        assert!(matches!(
            solver.check_sat(None),
            Err(SolverError::Unsupported(_))
        ));
        assert!(solver.assert(Term::Var(VarId(7)).le(1)).is_err());
    }
}

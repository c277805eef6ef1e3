use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SolverError;
use crate::term::{ConstraintSystem, Term, VarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

impl Literal {
    pub fn as_i64(&self) -> i64 {
        match self {
            Literal::Int(v) => *v,
            Literal::Bool(b) => *b as i64,
        }
    }
}

/// Values of the variables of a [ConstraintSystem] after a satisfiable check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    values: Vec<Option<Literal>>,
}

impl Assignment {
    pub fn with_capacity(num_vars: usize) -> Assignment {
        Assignment {
            values: vec![None; num_vars],
        }
    }

    pub fn set(&mut self, v: VarId, value: Literal) {
        if v.index() >= self.values.len() {
            self.values.resize(v.index() + 1, None);
        }
        self.values[v.index()] = Some(value);
    }

    pub fn get(&self, v: VarId) -> Option<Literal> {
        self.values.get(v.index()).copied().flatten()
    }

    /// Numeric value of `v`, booleans read as 0 and 1.
    pub fn value(&self, v: VarId) -> Option<i64> {
        self.get(v).map(|l| l.as_i64())
    }

    pub fn bool(&self, v: VarId) -> Option<bool> {
        self.get(v).map(|l| l.as_i64() != 0)
    }

    /// Looks a value up by its solver-visible name.
    pub fn by_name(&self, system: &ConstraintSystem, name: &str) -> Option<Literal> {
        system
            .decls()
            .iter()
            .position(|d| d.name == name)
            .and_then(|i| self.get(VarId(i as u32)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The constraint solver oracle.
///
/// A backend receives a whole [ConstraintSystem] through `load`, after which bounds can be
/// added in nested scopes with `push`, `assert` and `pop`. `load` always starts from a clean
/// solver state.
pub trait Solver: Send {
    fn unique_identifier(&self) -> String;

    fn load(&mut self, system: &ConstraintSystem) -> Result<(), SolverError>;

    fn push(&mut self);

    fn pop(&mut self);

    fn assert(&mut self, term: Term) -> Result<(), SolverError>;

    fn reset(&mut self);

    fn check_sat(&mut self, timeout: Option<Duration>) -> Result<SatResult, SolverError>;

    fn model(&self) -> Result<Assignment, SolverError>;
}

/// Creates independent solver instances, one per exploration thread or query.
pub trait SolverFactory: Send + Sync {
    fn unique_identifier(&self) -> String;

    fn create(&self) -> Box<dyn Solver>;
}

/// Scoped assertion stack shared by backends that re-send their whole state on every check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionStack {
    scopes: Vec<usize>,
    terms: Vec<Term>,
}

impl AssertionStack {
    pub fn push(&mut self) {
        self.scopes.push(self.terms.len());
    }

    pub fn pop(&mut self) {
        if let Some(len) = self.scopes.pop() {
            self.terms.truncate(len);
        }
    }

    pub fn assert(&mut self, term: Term) {
        self.terms.push(term);
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
        self.terms.clear();
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popping_discards_scoped_assertions_only() {
        let mut stack = AssertionStack::default();
        stack.assert(Term::Bool(true));
        stack.push();
        stack.assert(Term::Bool(false));
        stack.assert(Term::Bool(false));
        assert_eq!(stack.terms().len(), 3);
        stack.pop();
        assert_eq!(stack.terms(), &[Term::Bool(true)]);
        stack.pop();
        assert_eq!(stack.terms().len(), 1);
    }

    #[test]
    fn assignment_reads_booleans_as_integers() {
        let mut sys = ConstraintSystem::new();
        let b = sys.declare_bool("b");
        let x = sys.declare_int("x", None, None);
        let mut a = Assignment::with_capacity(sys.num_vars());
        a.set(b, Literal::Bool(true));
        a.set(x, Literal::Int(-3));
        assert_eq!(a.value(b), Some(1));
        assert_eq!(a.by_name(&sys, "x"), Some(Literal::Int(-3)));
        assert_eq!(a.by_name(&sys, "y"), None);
    }
}

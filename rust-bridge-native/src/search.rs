use std::time::{Duration, Instant};

use flowsched_core::{SolverError, Term, VarId};

use crate::domains::{Definition, Domain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    Exhausted,
    LimitReached,
}

/// Depth-first search over the domains of the undefined variables.
///
/// A constraint is evaluated as soon as its last variable gets a value, and a defined variable
/// is computed as soon as all of its dependencies have one. Values are tried in increasing
/// order, so the first solution found is the lexicographically smallest one.
pub struct Search<'a> {
    domains: &'a [Domain],
    constraints: Vec<&'a Term>,
    definitions: &'a [Option<Definition>],
    watchers: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    remaining: Vec<usize>,
    pending_deps: Vec<usize>,
    values: Vec<Option<i64>>,
    trail: Vec<usize>,
    decisions: Vec<usize>,
    nodes: u64,
    node_limit: Option<u64>,
    deadline: Option<Instant>,
}

impl<'a> Search<'a> {
    pub fn new(
        domains: &'a [Domain],
        constraints: Vec<&'a Term>,
        definitions: &'a [Option<Definition>],
    ) -> Result<Search<'a>, SolverError> {
        let n = domains.len();
        let mut watchers = vec![vec![]; n];
        let mut remaining = Vec::with_capacity(constraints.len());
        for (c, t) in constraints.iter().enumerate() {
            let vars = t.vars();
            for v in &vars {
                watchers[v.index()].push(c);
            }
            remaining.push(vars.len());
        }
        let mut dependents = vec![vec![]; n];
        let mut pending_deps = vec![0; n];
        for d in definitions.iter().flatten() {
            for dep in &d.deps {
                dependents[dep.index()].push(d.var.index());
            }
            pending_deps[d.var.index()] = d.deps.len();
        }
        let mut decisions = vec![];
        for v in 0..n {
            if definitions[v].is_some() {
                continue;
            }
            if !domains[v].is_bounded() && !watchers[v].is_empty() {
                return Err(SolverError::Unsupported(format!(
                    "unbounded decision variable #{}",
                    v
                )));
            }
            decisions.push(v);
        }
        Ok(Search {
            domains,
            constraints,
            definitions,
            watchers,
            dependents,
            remaining,
            pending_deps,
            values: vec![None; n],
            trail: vec![],
            decisions,
            nodes: 0,
            node_limit: None,
            deadline: None,
        })
    }

    pub fn with_limits(mut self, node_limit: Option<u64>, timeout: Option<Duration>) -> Self {
        self.node_limit = node_limit;
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }

    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    pub fn values(&self) -> &[Option<i64>] {
        &self.values
    }

    fn holds(&self, c: usize) -> bool {
        let values = &self.values;
        self.constraints[c]
            .evaluate(&|v: VarId| values[v.index()])
            .map_or(false, |r| r != 0)
    }

    fn compute(&self, v: usize) -> Option<i64> {
        let values = &self.values;
        self.definitions[v]
            .as_ref()
            .and_then(|d| d.body.evaluate(&|x: VarId| values[x.index()]))
    }

    /// Assigns `value` to `var` and everything it determines; false on a conflict.
    fn propagate(&mut self, var: usize, value: i64) -> bool {
        let mut queue = vec![(var, value)];
        while let Some((v, val)) = queue.pop() {
            if let Some(current) = self.values[v] {
                if current == val {
                    continue;
                }
                return false;
            }
            if !self.domains[v].contains(val) {
                return false;
            }
            self.values[v] = Some(val);
            self.trail.push(v);
            for k in 0..self.watchers[v].len() {
                let c = self.watchers[v][k];
                self.remaining[c] -= 1;
            }
            for k in 0..self.dependents[v].len() {
                let x = self.dependents[v][k];
                self.pending_deps[x] -= 1;
            }
            for k in 0..self.watchers[v].len() {
                let c = self.watchers[v][k];
                if self.remaining[c] == 0 && !self.holds(c) {
                    return false;
                }
            }
            for k in 0..self.dependents[v].len() {
                let x = self.dependents[v][k];
                if self.pending_deps[x] == 0 && self.values[x].is_none() {
                    match self.compute(x) {
                        Some(computed) => queue.push((x, computed)),
                        None => return false,
                    }
                }
            }
        }
        true
    }

    fn undo(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(v) = self.trail.pop() {
                self.values[v] = None;
                for k in 0..self.watchers[v].len() {
                    let c = self.watchers[v][k];
                    self.remaining[c] += 1;
                }
                for k in 0..self.dependents[v].len() {
                    let x = self.dependents[v][k];
                    self.pending_deps[x] += 1;
                }
            }
        }
    }

    /// Settles constant constraints and definitions before the first decision.
    fn initial(&mut self) -> bool {
        for c in 0..self.constraints.len() {
            if self.remaining[c] == 0 && !self.holds(c) {
                return false;
            }
        }
        for x in 0..self.values.len() {
            if self.definitions[x].is_some() && self.pending_deps[x] == 0 {
                match self.compute(x) {
                    Some(v) => {
                        if !self.propagate(x, v) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
        }
        true
    }

    fn out_of_budget(&self) -> bool {
        if let Some(limit) = self.node_limit {
            if self.nodes >= limit {
                return true;
            }
        }
        match self.deadline {
            Some(d) if self.nodes % 256 == 0 => Instant::now() >= d,
            _ => false,
        }
    }

    fn descend(&mut self, depth: usize) -> Outcome {
        if depth == self.decisions.len() {
            return Outcome::Found;
        }
        let v = self.decisions[depth];
        if self.values[v].is_some() {
            return self.descend(depth + 1);
        }
        let Domain { lower, upper } = self.domains[v];
        let (lo, hi) = match (lower, upper) {
            (Some(l), Some(u)) => (l, u),
            // unconstrained and unbounded: any value will do
            (Some(l), None) => (l, l),
            (None, Some(u)) => (u, u),
            (None, None) => (0, 0),
        };
        for val in lo..=hi {
            self.nodes += 1;
            if self.out_of_budget() {
                return Outcome::LimitReached;
            }
            let mark = self.trail.len();
            if self.propagate(v, val) {
                match self.descend(depth + 1) {
                    Outcome::Exhausted => {}
                    other => return other,
                }
            }
            self.undo(mark);
        }
        Outcome::Exhausted
    }

    pub fn run(&mut self) -> Outcome {
        if self.domains.iter().any(|d| d.is_empty()) {
            return Outcome::Exhausted;
        }
        if !self.initial() {
            return Outcome::Exhausted;
        }
        self.descend(0)
    }
}

use flowsched_core::{ConstraintSystem, Sort, Term, VarId};

/// Closed integer interval of a variable; booleans live in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl Domain {
    pub fn is_empty(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l > u)
    }

    pub fn is_bounded(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    pub fn contains(&self, v: i64) -> bool {
        self.lower.map_or(true, |l| v >= l) && self.upper.map_or(true, |u| v <= u)
    }

    fn raise(&mut self, l: i64) {
        self.lower = Some(self.lower.map_or(l, |cur| cur.max(l)));
    }

    fn cut(&mut self, u: i64) {
        self.upper = Some(self.upper.map_or(u, |cur| cur.min(u)));
    }
}

pub fn declared_domains(system: &ConstraintSystem) -> Vec<Domain> {
    system
        .decls()
        .iter()
        .map(|d| match d.sort {
            Sort::Bool => Domain {
                lower: Some(0),
                upper: Some(1),
            },
            Sort::Int => Domain {
                lower: d.lower,
                upper: d.upper,
            },
        })
        .collect()
}

/// Narrows `domains` with every assertion that bounds a single variable by a constant.
pub fn tighten_unit_bounds(domains: &mut [Domain], term: &Term) {
    match term {
        Term::And(ts) => {
            for t in ts {
                tighten_unit_bounds(domains, t);
            }
        }
        Term::Var(v) => domains[v.index()].raise(1),
        Term::Not(inner) => {
            if let Term::Var(v) = inner.as_ref() {
                domains[v.index()].cut(0);
            }
        }
        Term::Le(a, b) => match (a.as_ref(), b.as_ref()) {
            (Term::Var(v), Term::Int(c)) => domains[v.index()].cut(*c),
            (Term::Int(c), Term::Var(v)) => domains[v.index()].raise(*c),
            _ => {}
        },
        Term::Lt(a, b) => match (a.as_ref(), b.as_ref()) {
            (Term::Var(v), Term::Int(c)) => domains[v.index()].cut(c.saturating_sub(1)),
            (Term::Int(c), Term::Var(v)) => domains[v.index()].raise(c.saturating_add(1)),
            _ => {}
        },
        Term::Eq(a, b) => match (a.as_ref(), b.as_ref()) {
            (Term::Var(v), Term::Int(c)) | (Term::Int(c), Term::Var(v)) => {
                domains[v.index()].raise(*c);
                domains[v.index()].cut(*c);
            }
            _ => {}
        },
        _ => {}
    }
}

/// A variable computed from others: `var = body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub var: VarId,
    pub body: Term,
    pub deps: Vec<VarId>,
}

fn reaches(defs: &[Option<Definition>], from: VarId, target: VarId) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![false; defs.len()];
    while let Some(v) = stack.pop() {
        if v == target {
            return true;
        }
        if seen[v.index()] {
            continue;
        }
        seen[v.index()] = true;
        if let Some(d) = &defs[v.index()] {
            stack.extend(d.deps.iter().copied());
        }
    }
    false
}

/// Picks at most one acyclic definition per variable among the top-level equalities.
pub fn find_definitions(num_vars: usize, terms: &[&Term]) -> Vec<Option<Definition>> {
    let mut defs: Vec<Option<Definition>> = vec![None; num_vars];
    let mut queue: Vec<&Term> = terms.iter().rev().copied().collect();
    while let Some(t) = queue.pop() {
        match t {
            Term::And(ts) => queue.extend(ts.iter().rev()),
            Term::Eq(lhs, body) => {
                let (var, body) = match (lhs.as_ref(), body.as_ref()) {
                    (Term::Var(v), b) if !matches!(b, Term::Int(_)) => (*v, b),
                    (b, Term::Var(v)) if !matches!(b, Term::Int(_)) => (*v, b),
                    _ => continue,
                };
                if defs[var.index()].is_some() {
                    continue;
                }
                let deps = body.vars();
                if deps.iter().any(|d| reaches(&defs, *d, var)) {
                    continue;
                }
                defs[var.index()] = Some(Definition {
                    var,
                    body: body.clone(),
                    deps,
                });
            }
            _ => {}
        }
    }
    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_bounds_narrow_declared_domains() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(10));
        let b = sys.declare_bool("b");
        let y = sys.declare_int("y", None, None);
        let mut domains = declared_domains(&sys);
        tighten_unit_bounds(
            &mut domains,
            &Term::and(vec![Term::Var(x).lt(4), Term::Var(b).negate(), Term::Var(y).ge(-2)]),
        );
        assert_eq!(domains[0], Domain { lower: Some(0), upper: Some(3) });
        assert_eq!(domains[1], Domain { lower: Some(0), upper: Some(0) });
        assert_eq!(domains[2], Domain { lower: Some(-2), upper: None });
        tighten_unit_bounds(&mut domains, &Term::Var(x).equals(7));
        assert!(domains[0].is_empty());
    }

    #[test]
    fn cyclic_definitions_are_dropped() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", None, None);
        let y = sys.declare_int("y", None, None);
        let z = sys.declare_int("z", Some(0), Some(3));
        let a = Term::Var(x).equals(Term::Var(y).plus(1));
        let b = Term::Var(y).equals(Term::Var(x).minus(1));
        let c = Term::Var(y).equals(Term::Var(z).times(2));
        let defs = find_definitions(3, &[&a, &b, &c]);
        // y = x - 1 would close a cycle with x = y + 1
        assert_eq!(defs[y.index()].as_ref().map(|d| d.deps.clone()), Some(vec![z]));
        assert_eq!(defs[x.index()].as_ref().map(|d| d.deps.clone()), Some(vec![y]));
        assert!(defs[z.index()].is_none());
    }
}

/// Handle of a variable declared in a [ConstraintSystem].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sort {
    Int,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarDecl {
    pub name: String,
    pub sort: Sort,
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

/// Integer/boolean expression over declared variables.
///
/// Booleans evaluate to 0 and 1, `Div` and `Mod` follow the euclidean convention of
/// SMT-LIB integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Int(i64),
    Bool(bool),
    Var(VarId),
    Add(Vec<Term>),
    Sub(Box<Term>, Box<Term>),
    Mul(Box<Term>, Box<Term>),
    Div(Box<Term>, Box<Term>),
    Mod(Box<Term>, Box<Term>),
    Max(Vec<Term>),
    Ite(Box<Term>, Box<Term>, Box<Term>),
    Eq(Box<Term>, Box<Term>),
    Le(Box<Term>, Box<Term>),
    Lt(Box<Term>, Box<Term>),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Distinct(Vec<Term>),
}

impl From<VarId> for Term {
    fn from(v: VarId) -> Self {
        Term::Var(v)
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Term::Int(v)
    }
}

impl From<i32> for Term {
    fn from(v: i32) -> Self {
        Term::Int(v as i64)
    }
}

impl From<bool> for Term {
    fn from(v: bool) -> Self {
        Term::Bool(v)
    }
}

impl Term {
    pub fn int(v: i64) -> Term {
        Term::Int(v)
    }

    pub fn var(v: VarId) -> Term {
        Term::Var(v)
    }

    pub fn sum(terms: Vec<Term>) -> Term {
        match terms.len() {
            0 => Term::Int(0),
            1 => terms.into_iter().next().unwrap_or(Term::Int(0)),
            _ => Term::Add(terms),
        }
    }

    pub fn plus(self, other: impl Into<Term>) -> Term {
        match self {
            Term::Add(mut ts) => {
                ts.push(other.into());
                Term::Add(ts)
            }
            t => Term::Add(vec![t, other.into()]),
        }
    }

    pub fn minus(self, other: impl Into<Term>) -> Term {
        Term::Sub(Box::new(self), Box::new(other.into()))
    }

    pub fn times(self, other: impl Into<Term>) -> Term {
        Term::Mul(Box::new(self), Box::new(other.into()))
    }

    pub fn div(self, other: impl Into<Term>) -> Term {
        Term::Div(Box::new(self), Box::new(other.into()))
    }

    pub fn modulo(self, other: impl Into<Term>) -> Term {
        Term::Mod(Box::new(self), Box::new(other.into()))
    }

    pub fn max(terms: Vec<Term>) -> Term {
        match terms.len() {
            1 => terms.into_iter().next().unwrap_or(Term::Int(0)),
            _ => Term::Max(terms),
        }
    }

    pub fn ite(cond: Term, then: impl Into<Term>, otherwise: impl Into<Term>) -> Term {
        Term::Ite(
            Box::new(cond),
            Box::new(then.into()),
            Box::new(otherwise.into()),
        )
    }

    pub fn equals(self, other: impl Into<Term>) -> Term {
        Term::Eq(Box::new(self), Box::new(other.into()))
    }

    pub fn le(self, other: impl Into<Term>) -> Term {
        Term::Le(Box::new(self), Box::new(other.into()))
    }

    pub fn lt(self, other: impl Into<Term>) -> Term {
        Term::Lt(Box::new(self), Box::new(other.into()))
    }

    pub fn ge(self, other: impl Into<Term>) -> Term {
        Term::Le(Box::new(other.into()), Box::new(self))
    }

    pub fn gt(self, other: impl Into<Term>) -> Term {
        Term::Lt(Box::new(other.into()), Box::new(self))
    }

    pub fn negate(self) -> Term {
        Term::Not(Box::new(self))
    }

    pub fn and(terms: Vec<Term>) -> Term {
        match terms.len() {
            0 => Term::Bool(true),
            1 => terms.into_iter().next().unwrap_or(Term::Bool(true)),
            _ => Term::And(terms),
        }
    }

    pub fn or(terms: Vec<Term>) -> Term {
        match terms.len() {
            0 => Term::Bool(false),
            1 => terms.into_iter().next().unwrap_or(Term::Bool(false)),
            _ => Term::Or(terms),
        }
    }

    pub fn implies(self, other: Term) -> Term {
        Term::Implies(Box::new(self), Box::new(other))
    }

    pub fn distinct(terms: Vec<Term>) -> Term {
        Term::Distinct(terms)
    }

    fn children(&self) -> Vec<&Term> {
        match self {
            Term::Int(_) | Term::Bool(_) | Term::Var(_) => vec![],
            Term::Add(ts) | Term::Max(ts) | Term::And(ts) | Term::Or(ts) | Term::Distinct(ts) => {
                ts.iter().collect()
            }
            Term::Sub(a, b)
            | Term::Mul(a, b)
            | Term::Div(a, b)
            | Term::Mod(a, b)
            | Term::Eq(a, b)
            | Term::Le(a, b)
            | Term::Lt(a, b)
            | Term::Implies(a, b) => vec![a.as_ref(), b.as_ref()],
            Term::Not(a) => vec![a.as_ref()],
            Term::Ite(c, a, b) => vec![c.as_ref(), a.as_ref(), b.as_ref()],
        }
    }

    /// Appends every variable occurring in the term, duplicates included.
    pub fn collect_vars(&self, out: &mut Vec<VarId>) {
        if let Term::Var(v) = self {
            out.push(*v);
        }
        for c in self.children() {
            c.collect_vars(out);
        }
    }

    pub fn vars(&self) -> Vec<VarId> {
        let mut out = vec![];
        self.collect_vars(&mut out);
        out.sort();
        out.dedup();
        out
    }

    /// Evaluates the term, returning `None` when a variable has no value or a division by
    /// zero happens.
    pub fn evaluate(&self, values: &dyn Fn(VarId) -> Option<i64>) -> Option<i64> {
        let b = |x: bool| if x { 1 } else { 0 };
        Some(match self {
            Term::Int(v) => *v,
            Term::Bool(v) => b(*v),
            Term::Var(v) => values(*v)?,
            Term::Add(ts) => {
                let mut acc = 0i64;
                for t in ts {
                    acc = acc.checked_add(t.evaluate(values)?)?;
                }
                acc
            }
            Term::Sub(l, r) => l.evaluate(values)?.checked_sub(r.evaluate(values)?)?,
            Term::Mul(l, r) => l.evaluate(values)?.checked_mul(r.evaluate(values)?)?,
            Term::Div(l, r) => {
                let d = r.evaluate(values)?;
                if d == 0 {
                    return None;
                }
                l.evaluate(values)?.div_euclid(d)
            }
            Term::Mod(l, r) => {
                let d = r.evaluate(values)?;
                if d == 0 {
                    return None;
                }
                l.evaluate(values)?.rem_euclid(d)
            }
            Term::Max(ts) => {
                let mut acc: Option<i64> = None;
                for t in ts {
                    let v = t.evaluate(values)?;
                    acc = Some(acc.map_or(v, |a| a.max(v)));
                }
                acc?
            }
            Term::Ite(c, t, e) => {
                if c.evaluate(values)? != 0 {
                    t.evaluate(values)?
                } else {
                    e.evaluate(values)?
                }
            }
            Term::Eq(l, r) => b(l.evaluate(values)? == r.evaluate(values)?),
            Term::Le(l, r) => b(l.evaluate(values)? <= r.evaluate(values)?),
            Term::Lt(l, r) => b(l.evaluate(values)? < r.evaluate(values)?),
            Term::Not(t) => b(t.evaluate(values)? == 0),
            Term::And(ts) => {
                for t in ts {
                    if t.evaluate(values)? == 0 {
                        return Some(0);
                    }
                }
                1
            }
            Term::Or(ts) => {
                for t in ts {
                    if t.evaluate(values)? != 0 {
                        return Some(1);
                    }
                }
                0
            }
            Term::Implies(l, r) => {
                if l.evaluate(values)? == 0 {
                    1
                } else {
                    b(r.evaluate(values)? != 0)
                }
            }
            Term::Distinct(ts) => {
                let mut seen = Vec::with_capacity(ts.len());
                for t in ts {
                    let v = t.evaluate(values)?;
                    if seen.contains(&v) {
                        return Some(0);
                    }
                    seen.push(v);
                }
                1
            }
        })
    }
}

/// Declarations and assertions of one constraint model, independent of any solver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSystem {
    decls: Vec<VarDecl>,
    assertions: Vec<Term>,
}

impl ConstraintSystem {
    pub fn new() -> ConstraintSystem {
        ConstraintSystem::default()
    }

    pub fn declare_int(&mut self, name: &str, lower: Option<i64>, upper: Option<i64>) -> VarId {
        self.decls.push(VarDecl {
            name: name.to_string(),
            sort: Sort::Int,
            lower,
            upper,
        });
        VarId((self.decls.len() - 1) as u32)
    }

    pub fn declare_bool(&mut self, name: &str) -> VarId {
        self.decls.push(VarDecl {
            name: name.to_string(),
            sort: Sort::Bool,
            lower: None,
            upper: None,
        });
        VarId((self.decls.len() - 1) as u32)
    }

    pub fn assert(&mut self, t: Term) {
        self.assertions.push(t);
    }

    pub fn decl(&self, v: VarId) -> &VarDecl {
        &self.decls[v.index()]
    }

    pub fn decls(&self) -> &[VarDecl] {
        &self.decls
    }

    pub fn assertions(&self) -> &[Term] {
        &self.assertions
    }

    pub fn num_vars(&self) -> usize {
        self.decls.len()
    }

    /// Intersects the declared domain of `v` with `[lower, upper]`.
    pub fn tighten(&mut self, v: VarId, lower: Option<i64>, upper: Option<i64>) {
        let d = &mut self.decls[v.index()];
        d.lower = match (d.lower, lower) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        d.upper = match (d.upper, upper) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn clear(&mut self) {
        self.decls.clear();
        self.assertions.clear();
    }

    /// Checks every assertion and declared domain against complete values.
    pub fn is_satisfied_by(&self, values: &dyn Fn(VarId) -> Option<i64>) -> bool {
        let domains_ok = self.decls.iter().enumerate().all(|(i, d)| {
            match values(VarId(i as u32)) {
                Some(v) => {
                    d.lower.map_or(true, |l| v >= l) && d.upper.map_or(true, |u| v <= u)
                }
                None => false,
            }
        });
        domains_ok
            && self
                .assertions
                .iter()
                .all(|a| a.evaluate(values).map_or(false, |v| v != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_follows_euclidean_division() {
        let t = Term::int(-7).div(2);
        assert_eq!(t.evaluate(&|_| None), Some(-4));
        let m = Term::int(-7).modulo(2);
        assert_eq!(m.evaluate(&|_| None), Some(1));
        assert_eq!(Term::int(1).div(0).evaluate(&|_| None), None);
    }

    #[test]
    fn unassigned_variables_leave_terms_undecided() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(3));
        let t = Term::var(x).plus(1).le(3);
        assert_eq!(t.evaluate(&|_| None), None);
        assert_eq!(t.evaluate(&|_| Some(2)), Some(1));
        assert_eq!(t.vars(), vec![x]);
    }

    #[test]
    fn tighten_intersects_domains() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), None);
        sys.tighten(x, Some(-2), Some(9));
        assert_eq!(sys.decl(x).lower, Some(0));
        assert_eq!(sys.decl(x).upper, Some(9));
    }
}

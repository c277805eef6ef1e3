use std::fmt::Write;

use flowsched_core::{ConstraintSystem, SolverError, Sort, Term, VarDecl};

/// Writes a symbol, quoting it when it is not a simple SMT-LIB symbol.
pub fn symbol(name: &str) -> Result<String, SolverError> {
    if name.contains('|') || name.contains('\\') {
        return Err(SolverError::Unsupported(format!("the symbol name '{}'", name)));
    }
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    Ok(if simple {
        name.to_string()
    } else {
        format!("|{}|", name)
    })
}

fn int(v: i64) -> String {
    if v < 0 {
        format!("(- {})", v.unsigned_abs())
    } else {
        v.to_string()
    }
}

/// Renders terms of one [ConstraintSystem] as SMT-LIB2 text.
///
/// Every `Max` becomes a fresh integer constant bounded from below by each operand and equal
/// to one of them, declared right before the assertion that uses it.
pub struct ScriptPrinter<'a> {
    system: &'a ConstraintSystem,
    names: Vec<String>,
    auxiliaries: usize,
}

impl<'a> ScriptPrinter<'a> {
    pub fn new(system: &'a ConstraintSystem) -> Result<ScriptPrinter<'a>, SolverError> {
        let names = system
            .decls()
            .iter()
            .map(|d| symbol(&d.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScriptPrinter {
            system,
            names,
            auxiliaries: 0,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn declarations(&self, out: &mut String) {
        for (decl, name) in self.system.decls().iter().zip(&self.names) {
            let VarDecl {
                sort, lower, upper, ..
            } = decl;
            match sort {
                Sort::Int => {
                    let _ = writeln!(out, "(declare-const {} Int)", name);
                    if let Some(l) = lower {
                        let _ = writeln!(out, "(assert (>= {} {}))", name, int(*l));
                    }
                    if let Some(u) = upper {
                        let _ = writeln!(out, "(assert (<= {} {}))", name, int(*u));
                    }
                }
                Sort::Bool => {
                    let _ = writeln!(out, "(declare-const {} Bool)", name);
                }
            }
        }
    }

    pub fn assertion(&mut self, term: &Term, out: &mut String) {
        let mut prelude = String::new();
        let body = self.term(term, &mut prelude);
        out.push_str(&prelude);
        let _ = writeln!(out, "(assert {})", body);
    }

    fn nary(&mut self, op: &str, terms: &[Term], prelude: &mut String) -> String {
        let parts: Vec<String> = terms.iter().map(|t| self.term(t, prelude)).collect();
        format!("({} {})", op, parts.join(" "))
    }

    fn binary(&mut self, op: &str, a: &Term, b: &Term, prelude: &mut String) -> String {
        let (a, b) = (self.term(a, prelude), self.term(b, prelude));
        format!("({} {} {})", op, a, b)
    }

    pub fn term(&mut self, term: &Term, prelude: &mut String) -> String {
        match term {
            Term::Int(v) => int(*v),
            Term::Bool(b) => b.to_string(),
            Term::Var(v) => self.names[v.index()].clone(),
            Term::Add(ts) if ts.is_empty() => "0".to_string(),
            Term::Add(ts) if ts.len() == 1 => self.term(&ts[0], prelude),
            Term::Add(ts) => self.nary("+", ts, prelude),
            Term::Sub(a, b) => self.binary("-", a, b, prelude),
            Term::Mul(a, b) => self.binary("*", a, b, prelude),
            Term::Div(a, b) => self.binary("div", a, b, prelude),
            Term::Mod(a, b) => self.binary("mod", a, b, prelude),
            Term::Max(ts) if ts.len() == 1 => self.term(&ts[0], prelude),
            Term::Max(ts) => {
                let parts: Vec<String> = ts.iter().map(|t| self.term(t, prelude)).collect();
                let aux = format!("max!{}", self.auxiliaries);
                self.auxiliaries += 1;
                let _ = writeln!(prelude, "(declare-const {} Int)", aux);
                for p in &parts {
                    let _ = writeln!(prelude, "(assert (>= {} {}))", aux, p);
                }
                let choices: Vec<String> =
                    parts.iter().map(|p| format!("(= {} {})", aux, p)).collect();
                match choices.len() {
                    0 => {}
                    1 => {
                        let _ = writeln!(prelude, "(assert {})", choices[0]);
                    }
                    _ => {
                        let _ = writeln!(prelude, "(assert (or {}))", choices.join(" "));
                    }
                }
                aux
            }
            Term::Ite(c, a, b) => {
                let (c, a, b) = (
                    self.term(c, prelude),
                    self.term(a, prelude),
                    self.term(b, prelude),
                );
                format!("(ite {} {} {})", c, a, b)
            }
            Term::Eq(a, b) => self.binary("=", a, b, prelude),
            Term::Le(a, b) => self.binary("<=", a, b, prelude),
            Term::Lt(a, b) => self.binary("<", a, b, prelude),
            Term::Not(a) => {
                let a = self.term(a, prelude);
                format!("(not {})", a)
            }
            Term::And(ts) if ts.is_empty() => "true".to_string(),
            Term::And(ts) => self.nary("and", ts, prelude),
            Term::Or(ts) if ts.is_empty() => "false".to_string(),
            Term::Or(ts) => self.nary("or", ts, prelude),
            Term::Implies(a, b) => self.binary("=>", a, b, prelude),
            Term::Distinct(ts) if ts.len() < 2 => "true".to_string(),
            Term::Distinct(ts) => self.nary("distinct", ts, prelude),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_quoted_when_needed() {
        assert_eq!(symbol("start_A_0").unwrap(), "start_A_0");
        assert_eq!(symbol("start_my actor_0").unwrap(), "|start_my actor_0|");
        assert_eq!(symbol("0x").unwrap(), "|0x|");
        assert!(symbol("a|b").is_err());
    }

    #[test]
    fn terms_print_in_prefix_form() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(4));
        let b = sys.declare_bool("b");
        let mut p = ScriptPrinter::new(&sys).unwrap();
        let mut prelude = String::new();
        let t = Term::Var(b).implies(Term::Var(x).plus(-2).le(Term::Var(x).times(3)));
        assert_eq!(p.term(&t, &mut prelude), "(=> b (<= (+ x (- 2)) (* x 3)))");
        assert!(prelude.is_empty());
        let mut decls = String::new();
        p.declarations(&mut decls);
        assert_eq!(
            decls,
            "(declare-const x Int)\n(assert (>= x 0))\n(assert (<= x 4))\n(declare-const b Bool)\n"
        );
    }

    #[test]
    fn max_gets_an_auxiliary_constant() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", None, None);
        let y = sys.declare_int("y", None, None);
        let mut p = ScriptPrinter::new(&sys).unwrap();
        let mut out = String::new();
        p.assertion(
            &Term::max(vec![Term::Var(x), Term::Var(y)]).equals(3),
            &mut out,
        );
        assert_eq!(
            out,
            "(declare-const max!0 Int)\n(assert (>= max!0 x))\n(assert (>= max!0 y))\n\
             (assert (or (= max!0 x) (= max!0 y)))\n(assert (= max!0 3))\n"
        );
    }
}

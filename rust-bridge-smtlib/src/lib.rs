//! SMT-LIB2 backend talking to an external solver process (`z3 -in` by default).
//!
//! Every check spawns the solver anew and sends it the whole script: declarations, the loaded
//! assertions, the scoped assertions still on the stack, `(check-sat)` and, when satisfiable,
//! `(get-value ...)` for every declared variable.
pub mod printer;
pub mod sexpr;

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::time::Duration;

use flowsched_core::{
    AssertionStack, Assignment, ConstraintSystem, SatResult, Solver, SolverError, SolverFactory,
    Term,
};
use log::{debug, trace, warn};

use crate::printer::ScriptPrinter;

pub const DEFAULT_COMMAND: &str = "z3";

/// Whether `command` can be launched at all.
pub fn is_available(command: &str) -> bool {
    Command::new(command)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

pub struct SmtLibSolver {
    command: String,
    args: Vec<String>,
    system: ConstraintSystem,
    stack: AssertionStack,
    last_model: Option<Assignment>,
}

impl SmtLibSolver {
    pub fn new(command: &str, args: &[&str]) -> SmtLibSolver {
        SmtLibSolver {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            system: ConstraintSystem::new(),
            stack: AssertionStack::default(),
            last_model: None,
        }
    }

    /// The full script for one check.
    pub fn script(&self, timeout: Option<Duration>) -> Result<(String, Vec<String>), SolverError> {
        let mut printer = ScriptPrinter::new(&self.system)?;
        let mut out = String::new();
        out.push_str("(set-option :produce-models true)\n(set-logic ALL)\n");
        if let Some(t) = timeout {
            out.push_str(&format!("(set-option :timeout {})\n", t.as_millis().max(1)));
        }
        printer.declarations(&mut out);
        for t in self.system.assertions().iter().chain(self.stack.terms()) {
            printer.assertion(t, &mut out);
        }
        out.push_str("(check-sat)\n");
        Ok((out, printer.names().to_vec()))
    }

    fn run(&self, script: &str, names: &[String]) -> Result<(SatResult, Option<Assignment>), SolverError> {
        let launch = |reason: String| SolverError::Launch {
            command: self.command.clone(),
            reason,
        };
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| launch(e.to_string()))?;
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| launch("no standard input".to_string()))?;
            stdin.write_all(script.as_bytes())?;
            // after unsat the get-value error follows the verdict and is skipped
            if !names.is_empty() {
                writeln!(stdin, "(echo \"values\")\n(get-value ({}))", names.join(" "))?;
            }
            writeln!(stdin, "(exit)")?;
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch("no standard output".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut verdict = None;
        let mut assignment = None;
        while let Some(line) = lines.next() {
            let line = line?;
            let trimmed = line.trim();
            trace!("{} > {}", self.command, trimmed);
            if trimmed.is_empty() {
                continue;
            }
            match (verdict, trimmed) {
                (None, "sat") => verdict = Some(SatResult::Sat),
                (None, "unsat") => verdict = Some(SatResult::Unsat),
                (None, "unknown") | (None, "timeout") => verdict = Some(SatResult::Unknown),
                (None, _) if trimmed.starts_with("(error") => {
                    let _ = child.wait();
                    return Err(SolverError::Protocol(trimmed.to_string()));
                }
                (Some(SatResult::Sat), "values") | (Some(SatResult::Sat), "\"values\"") => {
                    let mut text = String::new();
                    for l in lines.by_ref() {
                        text.push_str(&l?);
                        text.push('\n');
                        if sexpr::balanced(&text) && text.contains(')') {
                            break;
                        }
                    }
                    let parsed = sexpr::values(&sexpr::parse(&text)?)?;
                    if parsed.len() != self.system.num_vars() {
                        return Err(SolverError::Protocol(format!(
                            "expected {} values, got {}",
                            self.system.num_vars(),
                            parsed.len()
                        )));
                    }
                    let mut a = Assignment::with_capacity(parsed.len());
                    for (i, value) in parsed.into_iter().enumerate() {
                        a.set(flowsched_core::VarId(i as u32), value);
                    }
                    assignment = Some(a);
                    break;
                }
                (None, other) => {
                    let _ = child.wait();
                    return Err(SolverError::Protocol(format!(
                        "unexpected answer '{}'",
                        other
                    )));
                }
                _ => {}
            }
        }
        let _ = child.wait();
        match verdict {
            Some(v) => Ok((v, assignment)),
            None => Err(SolverError::Protocol(format!(
                "'{}' closed its output without an answer",
                self.command
            ))),
        }
    }
}

impl Default for SmtLibSolver {
    fn default() -> Self {
        SmtLibSolver::new(DEFAULT_COMMAND, &["-in"])
    }
}

impl Solver for SmtLibSolver {
    fn unique_identifier(&self) -> String {
        format!("SmtLibSolver({})", self.command)
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
        let (script, names) = self.script(timeout)?;
        debug!(
            "sending {} declarations and {} assertions to '{}'",
            names.len(),
            self.system.assertions().len() + self.stack.terms().len(),
            self.command
        );
        let (verdict, assignment) = self.run(&script, &names)?;
        if verdict == SatResult::Sat {
            match assignment {
                Some(a) => self.last_model = Some(a),
                None if names.is_empty() => self.last_model = Some(Assignment::default()),
                None => warn!("'{}' answered sat but sent no values", self.command),
            }
        }
        Ok(verdict)
    }

    fn model(&self) -> Result<Assignment, SolverError> {
        self.last_model.clone().ok_or(SolverError::NoModel)
    }
}

pub struct SmtLibFactory {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for SmtLibFactory {
    fn default() -> Self {
        SmtLibFactory {
            command: DEFAULT_COMMAND.to_string(),
            args: vec!["-in".to_string()],
        }
    }
}

impl SolverFactory for SmtLibFactory {
    fn unique_identifier(&self) -> String {
        format!("SmtLibFactory({})", self.command)
    }

    fn create(&self) -> Box<dyn Solver> {
        let args: Vec<&str> = self.args.iter().map(|a| a.as_str()).collect();
        Box::new(SmtLibSolver::new(&self.command, &args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_carry_scoped_assertions_until_popped() {
        let mut sys = ConstraintSystem::new();
        let x = sys.declare_int("x", Some(0), Some(9));
        sys.assert(Term::Var(x).ge(2));
        let mut s = SmtLibSolver::default();
        s.load(&sys).unwrap();
        s.push();
        s.assert(Term::Var(x).le(3)).unwrap();
        let (script, names) = s.script(Some(Duration::from_millis(500))).unwrap();
        assert_eq!(names, vec!["x".to_string()]);
        assert!(script.contains("(set-option :timeout 500)"));
        assert!(script.contains("(assert (<= 2 x))"));
        assert!(script.contains("(assert (<= x 3))"));
        assert!(script.ends_with("(check-sat)\n"));
        s.pop();
        let (script, _) = s.script(None).unwrap();
        assert!(!script.contains("(assert (<= x 3))"));
        assert!(!script.contains(":timeout"));
        assert_eq!(s.model(), Err(SolverError::NoModel));
    }

    #[test]
    fn missing_commands_fail_to_launch() {
        let mut s = SmtLibSolver::new("flowsched-no-such-solver", &[]);
        s.load(&ConstraintSystem::new()).unwrap();
        assert!(matches!(
            s.check_sat(None),
            Err(SolverError::Launch { .. })
        ));
        assert!(!is_available("flowsched-no-such-solver"));
    }
}

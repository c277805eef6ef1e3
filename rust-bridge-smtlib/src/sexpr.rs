use flowsched_core::{Literal, SolverError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExpr {
    Atom(String),
    List(Vec<SExpr>),
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = vec![];
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' => tokens.push(c.to_string()),
            '|' => {
                let mut quoted = String::new();
                for q in chars.by_ref() {
                    if q == '|' {
                        break;
                    }
                    quoted.push(q);
                }
                tokens.push(quoted);
            }
            c if c.is_whitespace() => {}
            c => {
                let mut atom = c.to_string();
                while let Some(&n) = chars.peek() {
                    if n == '(' || n == ')' || n.is_whitespace() {
                        break;
                    }
                    atom.push(n);
                    chars.next();
                }
                tokens.push(atom);
            }
        }
    }
    tokens
}

/// Parses one s-expression; trailing text is ignored.
pub fn parse(text: &str) -> Result<SExpr, SolverError> {
    let tokens = tokenize(text);
    let mut stack: Vec<Vec<SExpr>> = vec![];
    for tok in tokens {
        match tok.as_str() {
            "(" => stack.push(vec![]),
            ")" => {
                let list = stack
                    .pop()
                    .ok_or_else(|| SolverError::Protocol(format!("unbalanced ')' in {}", text)))?;
                match stack.last_mut() {
                    Some(parent) => parent.push(SExpr::List(list)),
                    None => return Ok(SExpr::List(list)),
                }
            }
            _ => match stack.last_mut() {
                Some(parent) => parent.push(SExpr::Atom(tok)),
                None => return Ok(SExpr::Atom(tok)),
            },
        }
    }
    Err(SolverError::Protocol(format!("incomplete s-expression: {}", text)))
}

/// Reads a literal value: `true`, `false`, `7` or `(- 7)`.
pub fn literal(e: &SExpr) -> Result<Literal, SolverError> {
    let bad = || SolverError::Protocol(format!("not a literal value: {:?}", e));
    match e {
        SExpr::Atom(a) if a == "true" => Ok(Literal::Bool(true)),
        SExpr::Atom(a) if a == "false" => Ok(Literal::Bool(false)),
        SExpr::Atom(a) => a.parse::<i64>().map(Literal::Int).map_err(|_| bad()),
        SExpr::List(items) => match items.as_slice() {
            [SExpr::Atom(minus), inner] if minus == "-" => match literal(inner)? {
                Literal::Int(v) => Ok(Literal::Int(-v)),
                Literal::Bool(_) => Err(bad()),
            },
            _ => Err(bad()),
        },
    }
}

/// Values of a `(get-value (...))` answer, in request order.
pub fn values(answer: &SExpr) -> Result<Vec<Literal>, SolverError> {
    match answer {
        SExpr::List(pairs) => pairs
            .iter()
            .map(|p| match p {
                SExpr::List(kv) if kv.len() == 2 => literal(&kv[1]),
                other => Err(SolverError::Protocol(format!(
                    "not a (name value) pair: {:?}",
                    other
                ))),
            })
            .collect(),
        SExpr::Atom(a) => Err(SolverError::Protocol(format!(
            "expected a value list, got '{}'",
            a
        ))),
    }
}

/// Whether every opened parenthesis of `text` is closed.
pub fn balanced(text: &str) -> bool {
    let mut depth = 0i64;
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '|' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_value_answers_are_read_in_order() {
        let answer = parse("((start_A_0 0)\n (|start_my actor_0| (- 4))\n (wrap_B_0 true))").unwrap();
        assert_eq!(
            values(&answer).unwrap(),
            vec![Literal::Int(0), Literal::Int(-4), Literal::Bool(true)]
        );
    }

    #[test]
    fn malformed_answers_are_protocol_errors() {
        assert!(parse("((x 1)").is_err());
        assert!(values(&parse("((x))").unwrap()).is_err());
        assert!(balanced("((a 1)\n (b 2))"));
        assert!(!balanced("((a 1)"));
    }
}

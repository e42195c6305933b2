use crate::error::{Error, Result};
use crate::types::Value;

use super::ast::{BinaryOp, Expr, UnaryOp};

/// Resolves column references while evaluating an expression. A `Row`
/// backs this with a flat list of `(qualified_name, Value)` pairs built by
/// the executor for the current table (CHECK constraints) or current
/// joined row (WHERE/HAVING/SELECT-list expressions).
pub trait Lookup {
    fn get(&self, name: &str) -> Option<Value>;
}

#[derive(Debug, Clone, Default)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.columns.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(n, _)| {
                        n.rsplit('.').next().map(|s| s.eq_ignore_ascii_case(name)).unwrap_or(false)
                    })
                    .map(|(_, v)| v)
            })
    }
}

impl Lookup for Row {
    fn get(&self, name: &str) -> Option<Value> {
        Row::get(self, name).cloned()
    }
}

/// NULL compares to false in every comparison and boolean context, rather
/// than propagating SQL's three-valued "unknown" logic. This is a
/// deliberate simplification kept consistent across WHERE and CHECK
/// evaluation.
pub fn eval_expr(expr: &Expr, row: &dyn Lookup, params: &[Value]) -> Result<Value> {
    match expr {
        Expr::IntLiteral(v) => Ok(Value::Integer(*v)),
        Expr::RealLiteral(v) => Ok(Value::Real(*v)),
        Expr::StringLiteral(v) => Ok(Value::Text(v.clone())),
        Expr::BoolLiteral(v) => Ok(Value::Boolean(*v)),
        Expr::BlobLiteral(v) => Ok(Value::Blob(v.clone())),
        Expr::Null => Ok(Value::Null),
        Expr::ColumnRef(name) => Ok(row.get(name).unwrap_or(Value::Null)),
        Expr::Param(idx) => params
            .get(*idx)
            .cloned()
            .ok_or_else(|| Error::Execution("Not enough parameters".into())),
        Expr::BinaryOp { left, op, right } => eval_binary(left, *op, right, row, params),
        Expr::UnaryOp { op, operand } => {
            let v = eval_expr(operand, row, params)?;
            match op {
                UnaryOp::Not => Ok(Value::Boolean(!truthy(&v))),
                UnaryOp::Neg => match v {
                    Value::Integer(i) => Ok(Value::Integer(-i)),
                    Value::Real(r) => Ok(Value::Real(-r)),
                    Value::Null => Ok(Value::Null),
                    other => Err(Error::Type(format!("cannot negate {other:?}"))),
                },
            }
        }
        Expr::Like { expr, pattern, negated } => {
            let v = eval_expr(expr, row, params)?;
            let p = eval_expr(pattern, row, params)?;
            if v.is_null() || p.is_null() {
                return Ok(Value::Boolean(false));
            }
            let text = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
            let pat = p.as_str().map(str::to_string).unwrap_or_else(|| p.to_string());
            let matched = like_match(&text, &pat);
            Ok(Value::Boolean(matched != *negated))
        }
        Expr::InList { expr, list, negated } => {
            let v = eval_expr(expr, row, params)?;
            if v.is_null() {
                return Ok(Value::Boolean(false));
            }
            let mut found = false;
            for item in list {
                let iv = eval_expr(item, row, params)?;
                if values_equal(&v, &iv) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Boolean(found != *negated))
        }
        Expr::Between { expr, low, high, negated } => {
            let v = eval_expr(expr, row, params)?;
            let lo = eval_expr(low, row, params)?;
            let hi = eval_expr(high, row, params)?;
            if v.is_null() || lo.is_null() || hi.is_null() {
                return Ok(Value::Boolean(false));
            }
            let within = compare_values(&v, &lo)? != std::cmp::Ordering::Less
                && compare_values(&v, &hi)? != std::cmp::Ordering::Greater;
            Ok(Value::Boolean(within != *negated))
        }
        Expr::IsNull { expr, negated } => {
            let v = eval_expr(expr, row, params)?;
            Ok(Value::Boolean(v.is_null() != *negated))
        }
        Expr::AggregateFunc { .. } => {
            Err(Error::Execution("aggregate functions are only valid in the SELECT list".into()))
        }
        Expr::CaseWhen { operand, when_clauses, else_clause } => {
            let subject = operand.as_ref().map(|o| eval_expr(o, row, params)).transpose()?;
            for (cond, then) in when_clauses {
                let matched = match (&subject, &operand) {
                    (Some(subj), Some(_)) => {
                        let cv = eval_expr(cond, row, params)?;
                        values_equal(subj, &cv)
                    }
                    _ => truthy(&eval_expr(cond, row, params)?),
                };
                if matched {
                    return eval_expr(then, row, params);
                }
            }
            match else_clause {
                Some(e) => eval_expr(e, row, params),
                None => Ok(Value::Null),
            }
        }
        Expr::FunctionCall { name, args } => eval_function_call(name, args, row, params),
        Expr::InSubquery { .. } | Expr::ScalarSubquery(_) => {
            Err(Error::Execution("subquery must be resolved before evaluation".into()))
        }
    }
}

/// `ROUND(expr [, digits])` is the only scalar function the grammar
/// produces today; everything else is an unknown-function execution error.
fn eval_function_call(name: &str, args: &[Expr], row: &dyn Lookup, params: &[Value]) -> Result<Value> {
    match name {
        "ROUND" => {
            if args.is_empty() || args.len() > 2 {
                return Err(Error::Execution("ROUND requires 1 or 2 arguments".into()));
            }
            let v = eval_expr(&args[0], row, params)?;
            let digits = if args.len() == 2 {
                eval_expr(&args[1], row, params)?
            } else {
                Value::Integer(0)
            };
            round_value(v, digits)
        }
        other => Err(Error::Execution(format!("unknown function {other}"))),
    }
}

/// Shared by `ROUND(...)` as an ordinary expression and by the executor's
/// post-aggregate `ROUND(AVG(expr), digits)` handling (spec §4.8.7).
pub fn round_value(v: Value, digits: Value) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    match v {
        Value::Integer(i) => Ok(Value::Integer(i)),
        other => {
            let d = digits
                .as_i64()
                .ok_or_else(|| Error::Type("ROUND digits must be an integer".into()))? as i32;
            let f = other.as_f64().ok_or_else(|| Error::Type(format!("cannot ROUND {other:?}")))?;
            let factor = 10f64.powi(d);
            Ok(Value::Real((f * factor).round() / factor))
        }
    }
}

fn eval_binary(left: &Expr, op: BinaryOp, right: &Expr, row: &dyn Lookup, params: &[Value]) -> Result<Value> {
    if op == BinaryOp::And {
        let l = eval_expr(left, row, params)?;
        if !truthy(&l) {
            return Ok(Value::Boolean(false));
        }
        let r = eval_expr(right, row, params)?;
        return Ok(Value::Boolean(truthy(&r)));
    }
    if op == BinaryOp::Or {
        let l = eval_expr(left, row, params)?;
        if truthy(&l) {
            return Ok(Value::Boolean(true));
        }
        let r = eval_expr(right, row, params)?;
        return Ok(Value::Boolean(truthy(&r)));
    }

    let l = eval_expr(left, row, params)?;
    let r = eval_expr(right, row, params)?;

    match op {
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            if l.is_null() || r.is_null() {
                return Ok(Value::Boolean(false));
            }
            let ord = compare_values(&l, &r)?;
            let result = match op {
                BinaryOp::Eq => ord == std::cmp::Ordering::Equal,
                BinaryOp::Ne => ord != std::cmp::Ordering::Equal,
                BinaryOp::Lt => ord == std::cmp::Ordering::Less,
                BinaryOp::Gt => ord == std::cmp::Ordering::Greater,
                BinaryOp::Le => ord != std::cmp::Ordering::Greater,
                BinaryOp::Ge => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Boolean(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arith(&l, op, &r)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

fn arith(l: &Value, op: BinaryOp, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if let (Some(a), Some(b)) = (as_i64_strict(l), as_i64_strict(r)) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(Error::Execution("division by zero".into()));
                }
                a.checked_div(b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(Error::Execution("division by zero".into()));
                }
                a.checked_rem(b)
            }
            _ => unreachable!(),
        };
        return result
            .map(Value::Integer)
            .ok_or_else(|| Error::Execution("integer overflow".into()));
    }
    let a = l.as_f64().ok_or_else(|| Error::Type(format!("cannot apply arithmetic to {l:?}")))?;
    let b = r.as_f64().ok_or_else(|| Error::Type(format!("cannot apply arithmetic to {r:?}")))?;
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!(),
    };
    Ok(Value::Real(result))
}

fn as_i64_strict(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(i) => Some(*i),
        _ => None,
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Boolean(b) => *b,
        Value::Integer(i) => *i != 0,
        Value::Null => false,
        _ => true,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    compare_values(a, b).map(|o| o == std::cmp::Ordering::Equal).unwrap_or(false)
}

pub fn compare_values(a: &Value, b: &Value) -> Result<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Ok(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) | (Value::Timestamp(x), Value::Timestamp(y)) => Ok(x.cmp(y)),
        (Value::Blob(x), Value::Blob(y)) => Ok(x.cmp(y)),
        (Value::Decimal(x), Value::Decimal(y)) => Ok(x.cmp(y)),
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
            } else {
                Err(Error::Type(format!("cannot compare {a:?} with {b:?}")))
            }
        }
    }
}

/// A small SQL LIKE matcher: `%` matches any run of characters, `_`
/// matches exactly one.
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    like_rec(&t, &p)
}

fn like_rec(t: &[char], p: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('%') => like_rec(t, &p[1..]) || (!t.is_empty() && like_rec(&t[1..], p)),
        Some('_') => !t.is_empty() && like_rec(&t[1..], &p[1..]),
        Some(c) => !t.is_empty() && t[0] == *c && like_rec(&t[1..], &p[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_supports_wildcards() {
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "h_llo"));
        assert!(!like_match("hello", "world"));
    }

    #[test]
    fn null_comparison_is_false() {
        let row = Row::default();
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Null),
            op: BinaryOp::Eq,
            right: Box::new(Expr::IntLiteral(1)),
        };
        let v = eval_expr(&expr, &row, &[]).unwrap();
        assert_eq!(v, Value::Boolean(false));
    }
}

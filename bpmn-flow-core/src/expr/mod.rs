//! Sandboxed boolean conditions for exclusive gateways.
//!
//! Conditions are parsed by a small grammar ([`parser`]) and interpreted
//! against the variable bag. Nothing is ever handed to a general-purpose
//! runtime: the only things an expression can do are read variables, compare
//! values and combine booleans.

pub mod parser;

use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

use crate::types::Variables;

pub use parser::parse_expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `order.customer.tier` → `["order", "customer", "tier"]`.
    Path(Vec<String>),
    Not(Box<Expr>),
    /// Two or more terms, evaluated left to right with short-circuit.
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("cannot compare {left} {op} {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

/// Parse and evaluate `source`, coercing the result to a boolean.
pub fn eval_condition(source: &str, vars: &Variables) -> Result<bool, ExprError> {
    let expr = parse_expression(source)?;
    Ok(truthy(&expr.eval(vars)?))
}

impl Expr {
    pub fn eval(&self, vars: &Variables) -> Result<Value, ExprError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path(segments) => lookup(segments, vars),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(vars)?))),
            Expr::And(terms) => {
                for term in terms {
                    if !truthy(&term.eval(vars)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(terms) => {
                for term in terms {
                    if truthy(&term.eval(vars)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Compare(op, lhs, rhs) => {
                let (l, r) = (lhs.eval(vars)?, rhs.eval(vars)?);
                compare(*op, &l, &r).map(Value::Bool)
            }
        }
    }
}

/// Root variables must exist; missing nested fields read as `null`.
fn lookup(segments: &[String], vars: &Variables) -> Result<Value, ExprError> {
    let Some((root, rest)) = segments.split_first() else {
        return Ok(Value::Null);
    };
    let mut current = vars
        .get(root)
        .ok_or_else(|| ExprError::UnknownVariable { name: root.clone() })?;
    for segment in rest {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|ix| items.get(ix)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Ok(Value::Null),
        }
    }
    Ok(current.clone())
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => Ok(loose_eq(l, r)),
        CmpOp::Ne => Ok(!loose_eq(l, r)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(l, r).ok_or(ExprError::TypeMismatch {
                op: op.symbol(),
                left: type_name(l),
                right: type_name(r),
            })?;
            Ok(match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) if l.is_number() || r.is_number() => a == b,
        _ => l == r,
    }
}

/// Numbers numerically, strings lexicographically, a numeric string against a
/// number numerically. Anything else has no order.
fn order(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            let (a, b) = (as_number(l)?, as_number(r)?);
            a.partial_cmp(&b)
        }
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JavaScript-style truthiness.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_amount_threshold() {
        let big = vars(json!({ "amount": 1500 }));
        let small = vars(json!({ "amount": 10 }));
        assert!(eval_condition("amount > 1000", &big).unwrap());
        assert!(!eval_condition("amount > 1000", &small).unwrap());
    }

    #[test]
    fn test_numeric_string_compares_numerically() {
        let v = vars(json!({ "amount": "1500", "label": "10" }));
        assert!(eval_condition("amount > 1000", &v).unwrap());
        assert!(eval_condition("amount == 1500", &v).unwrap());
        assert!(eval_condition("label < '9'", &v).unwrap());
    }

    #[test]
    fn test_boolean_connectives_short_circuit() {
        let v = vars(json!({ "approved": true }));
        assert!(eval_condition("approved || missing > 1", &v).unwrap());
        assert!(!eval_condition("!approved && missing > 1", &v).unwrap());
        assert!(eval_condition("not (approved and false)", &v).unwrap());
    }

    #[test]
    fn test_unknown_root_variable_is_an_error() {
        let v = Variables::new();
        assert_eq!(
            eval_condition("amount > 1", &v).unwrap_err(),
            ExprError::UnknownVariable {
                name: "amount".into()
            }
        );
    }

    #[test]
    fn test_missing_nested_field_is_null() {
        let v = vars(json!({ "order": { "items": [ { "sku": "A1" } ] } }));
        assert!(eval_condition("order.express == null", &v).unwrap());
        assert!(eval_condition("order.items.0.sku === 'A1'", &v).unwrap());
        assert!(!eval_condition("order.express", &v).unwrap());
    }

    #[test]
    fn test_ordering_mismatch_is_type_error() {
        let v = vars(json!({ "flag": true, "tags": [] }));
        assert!(matches!(
            eval_condition("flag > 1", &v),
            Err(ExprError::TypeMismatch { .. })
        ));
        assert!(matches!(
            eval_condition("tags < 'a'", &v),
            Err(ExprError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&Value::Null));
        assert!(truthy(&json!("0")));
        assert!(truthy(&json!({})));
    }
}

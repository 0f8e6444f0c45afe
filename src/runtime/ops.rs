//! Evaluation helpers shared by generated solver code and the IR
//! interpreter.
//!
//! Guard failure is a result-type short-circuit, not an exception: an
//! arithmetic operand that is unbound or ill-typed evaluates to `None`,
//! comparisons over `None` are false, and a body tell over `None` fails the
//! unification, which the caller turns into `CHRFalse`. Nothing here ever
//! escapes an occurrence procedure.

use super::builtin::BuiltinStore;
use super::error::{RuntimeError, RuntimeResult};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn as_int(store: &BuiltinStore, value: &Value) -> Option<i64> {
    match store.resolve(value) {
        Value::Int(n) => Some(n),
        _ => None,
    }
}

fn as_bool(store: &BuiltinStore, value: &Value) -> Option<bool> {
    match store.resolve(value) {
        Value::Bool(b) => Some(b),
        _ => None,
    }
}

/// Integer arithmetic over resolved operands. Division and remainder by
/// zero evaluate to `None` like any other undefined operation.
pub fn arith(
    store: &BuiltinStore,
    op: NumOp,
    left: Option<Value>,
    right: Option<Value>,
) -> Option<Value> {
    let l = as_int(store, &left?)?;
    let r = as_int(store, &right?)?;
    let result = match op {
        NumOp::Add => l.checked_add(r)?,
        NumOp::Sub => l.checked_sub(r)?,
        NumOp::Mul => l.checked_mul(r)?,
        NumOp::Div => l.checked_div(r)?,
        NumOp::Rem => l.checked_rem(r)?,
    };
    Some(Value::Int(result))
}

/// Arithmetic negation.
pub fn neg(store: &BuiltinStore, value: Option<Value>) -> Option<Value> {
    Some(Value::Int(as_int(store, &value?)?.checked_neg()?))
}

/// Comparison asks. Equality is the variable equality relation; the ordered
/// comparisons resolve both sides to integers or to strings.
pub fn compare(store: &BuiltinStore, op: CmpOp, left: Option<Value>, right: Option<Value>) -> bool {
    let (Some(left), Some(right)) = (left, right) else {
        return false;
    };
    match op {
        CmpOp::Eq => store.ask_eq(&left, &right),
        CmpOp::Ne => !store.ask_eq(&left, &right),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = match (store.resolve(&left), store.resolve(&right)) {
                (Value::Int(l), Value::Int(r)) => l.cmp(&r),
                (Value::Str(l), Value::Str(r)) => l.cmp(&r),
                _ => return false,
            };
            match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            }
        }
    }
}

pub fn bool_not(store: &BuiltinStore, value: Option<Value>) -> Option<Value> {
    Some(Value::Bool(!as_bool(store, &value?)?))
}

pub fn bool_and(
    store: &BuiltinStore,
    left: Option<Value>,
    right: Option<Value>,
) -> Option<Value> {
    Some(Value::Bool(
        as_bool(store, &left?)? && as_bool(store, &right?)?,
    ))
}

pub fn bool_or(store: &BuiltinStore, left: Option<Value>, right: Option<Value>) -> Option<Value> {
    Some(Value::Bool(
        as_bool(store, &left?)? || as_bool(store, &right?)?,
    ))
}

/// `is_bound` ask.
pub fn is_bound_opt(store: &BuiltinStore, value: Option<&Value>) -> bool {
    match value {
        Some(Value::Var(v)) => store.is_bound(v.index),
        Some(_) => true,
        None => false,
    }
}

/// Unification lifted over undefined operands: an operand that failed to
/// evaluate fails the unification instead of erroring.
pub fn unify_opt(
    store: &mut BuiltinStore,
    left: Option<Value>,
    right: Option<Value>,
) -> RuntimeResult<bool> {
    match (left, right) {
        (Some(left), Some(right)) => store.unify(&left, &right),
        _ => Ok(false),
    }
}

/// Container constructors over possibly-undefined elements.
pub fn list(items: Vec<Option<Value>>) -> Option<Value> {
    Some(Value::List(items.into_iter().collect::<Option<Vec<_>>>()?))
}

pub fn tuple(items: Vec<Option<Value>>) -> Option<Value> {
    Some(Value::Tuple(items.into_iter().collect::<Option<Vec<_>>>()?))
}

pub fn dict(entries: Vec<(Option<Value>, Option<Value>)>) -> Option<Value> {
    let mut map = std::collections::BTreeMap::new();
    for (key, value) in entries {
        map.insert(key?, value?);
    }
    Some(Value::Dict(map))
}

/// A head-matching pattern with runtime leaves: `Equal` compares a subject
/// component through the variable equality relation, `Bind` unifies a
/// locally fresh variable with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPattern {
    Bind(Value),
    Equal(Value),
    List(Vec<MatchPattern>),
    Tuple(Vec<MatchPattern>),
    Dict(Vec<(Value, MatchPattern)>),
}

/// Destructuring match of `subject` against `pattern`. Only `Bind` leaves
/// may produce bindings (through the trail); structural mismatches and
/// unbound subjects fail the match.
pub fn matches(
    store: &mut BuiltinStore,
    subject: &Value,
    pattern: &MatchPattern,
) -> RuntimeResult<bool> {
    match pattern {
        MatchPattern::Bind(var) => store.unify(var, subject),
        MatchPattern::Equal(value) => Ok(store.ask_eq(value, subject)),
        MatchPattern::List(patterns) => match store.resolve(subject) {
            Value::List(items) if items.len() == patterns.len() => {
                for (item, pattern) in items.iter().zip(patterns) {
                    if !matches(store, item, pattern)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        },
        MatchPattern::Tuple(patterns) => match store.resolve(subject) {
            Value::Tuple(items) if items.len() == patterns.len() => {
                for (item, pattern) in items.iter().zip(patterns) {
                    if !matches(store, item, pattern)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        },
        MatchPattern::Dict(entries) => match store.resolve(subject) {
            Value::Dict(map) if map.len() == entries.len() => {
                for (key, pattern) in entries {
                    let Some(item) = map.get(key) else {
                        return Ok(false);
                    };
                    if !matches(store, item, pattern)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        },
    }
}

/// [`matches`] lifted over a possibly-undefined subject.
pub fn matches_opt(
    store: &mut BuiltinStore,
    subject: Option<Value>,
    pattern: &MatchPattern,
) -> RuntimeResult<bool> {
    match subject {
        Some(subject) => matches(store, &subject, pattern),
        None => Ok(false),
    }
}

/// Require an evaluated value, failing the query when the expression was
/// undefined.
pub fn require(value: Option<Value>, context: &str) -> RuntimeResult<Value> {
    value.ok_or_else(|| RuntimeError::False {
        messages: vec![format!("cannot evaluate argument of {context}")],
    })
}

/// Resolved display form of a value, for failure messages. Strings render
/// bare, without their surface quotes.
pub fn display(store: &BuiltinStore, value: &Value) -> String {
    match store.resolve(value) {
        Value::Str(s) => s,
        other => other.to_string(),
    }
}

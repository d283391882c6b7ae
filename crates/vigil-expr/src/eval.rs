use std::cmp::Ordering;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::env::Env;
use crate::error::{ExprError, Result};
use crate::value::Value;

/// Deepest expression tree [`eval`] walks. Long operator chains nest on
/// one side, so this is wider than the parser's bracket limit.
pub const MAX_EVAL_DEPTH: usize = 512;

/// Evaluates an expression tree against a binding environment.
pub fn eval(expr: &Expr, env: &Env) -> Result<Value> {
    eval_at(expr, env, 0)
}

fn eval_at(expr: &Expr, env: &Env, depth: usize) -> Result<Value> {
    if depth > MAX_EVAL_DEPTH {
        return Err(ExprError::Parse(format!(
            "expression nests deeper than {MAX_EVAL_DEPTH} levels"
        )));
    }
    let eval_child = |e: &Expr, env: &Env| eval_at(e, env, depth + 1);
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| eval_child(item, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Expr::Unary(op, operand) => eval_unary(*op, eval_child(operand, env)?),
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !expect_bool(eval_child(lhs, env)?, "and")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(eval_child(rhs, env)?, "and")?))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if expect_bool(eval_child(lhs, env)?, "or")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(eval_child(rhs, env)?, "or")?))
        }
        Expr::Binary(op, lhs, rhs) => {
            eval_binary(*op, eval_child(lhs, env)?, eval_child(rhs, env)?)
        }
        Expr::Field(target, name) => match eval_child(target, env)? {
            Value::Map(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
            other => Err(ExprError::Type(format!(
                "cannot access field '{name}' on {}",
                other.type_name()
            ))),
        },
        Expr::Index(target, index) => {
            eval_index(eval_child(target, env)?, eval_child(index, env)?)
        }
    }
}

/// Evaluates an expression that must produce a boolean.
pub fn eval_bool(expr: &Expr, env: &Env) -> Result<bool> {
    match eval(expr, env)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::NotBoolean(other.type_name())),
    }
}

fn expect_bool(value: Value, op: &str) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Type(format!(
            "'{op}' requires bool operands, got {}",
            other.type_name()
        ))),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or(ExprError::Overflow),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, other) => Err(ExprError::Type(format!(
            "'not' requires bool, got {}",
            other.type_name()
        ))),
        (UnaryOp::Neg, other) => Err(ExprError::Type(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        BinaryOp::In => contains(&rhs, &lhs).map(Value::Bool),
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (lhs, rhs) => arithmetic(op, lhs, rhs),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, lhs, rhs),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators handled in eval"),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or(ExprError::Overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or(ExprError::Overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or(ExprError::Overflow),
            BinaryOp::Div if b == 0 => Err(ExprError::DivisionByZero),
            BinaryOp::Div => Ok(Value::Float(a as f64 / b as f64)),
            BinaryOp::Mod if b == 0 => Err(ExprError::DivisionByZero),
            BinaryOp::Mod => a.checked_rem(b).map(Value::Int).ok_or(ExprError::Overflow),
            _ => unreachable!("non-arithmetic operator {op:?}"),
        };
    }

    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && rhs == Value::Int(0) {
        return Err(ExprError::DivisionByZero);
    }

    let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ExprError::Type(format!(
                "unsupported operand types for {op:?}: {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )))
        }
    };
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("non-arithmetic operator {op:?}"),
    }))
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| ExprError::Type("cannot order NaN".into())),
            _ => Err(ExprError::Type(format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            ))),
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool> {
    match (haystack, needle) {
        (Value::List(items), _) => Ok(items.iter().any(|item| item.loose_eq(needle))),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
        _ => Err(ExprError::Type(format!(
            "'in' not supported for {} in {}",
            needle.type_name(),
            haystack.type_name()
        ))),
    }
}

fn eval_index(target: Value, index: Value) -> Result<Value> {
    match (target, index) {
        (Value::List(mut items), Value::Int(i)) => {
            let len = items.len();
            usize::try_from(i)
                .ok()
                .filter(|i| *i < len)
                .map(|i| items.swap_remove(i))
                .ok_or_else(|| ExprError::Type(format!("index {i} out of range for list of {len}")))
        }
        (Value::Bytes(bytes), Value::Int(i)) => usize::try_from(i)
            .ok()
            .and_then(|i| bytes.get(i).copied())
            .map(|b| Value::Int(b.into()))
            .ok_or_else(|| {
                ExprError::Type(format!("index {i} out of range for {} bytes", bytes.len()))
            }),
        (Value::Map(mut map), Value::Str(key)) => Ok(map.remove(&key).unwrap_or(Value::Null)),
        (target, index) => Err(ExprError::Type(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

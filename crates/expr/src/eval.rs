//! Expression evaluation over a row's values.
//!
//! Null propagates through arithmetic and comparisons; AND/OR use
//! three-valued logic. A filter treats a null result as "no match".

use crate::ast::{BinaryOp, Expr, Function, UnaryOp};
use core::cmp::Ordering;
use tabula_core::pattern_match::like;
use tabula_core::{Error, Result, Value};

/// Evaluation settings taken from the owning table.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalContext {
    pub case_sensitive: bool,
}

fn eval_error(message: impl Into<String>) -> Error {
    Error::expression(message, 0)
}

/// Evaluates `expr` against one row.
pub fn eval(expr: &Expr, row: &[Value], ctx: EvalContext) -> Result<Value> {
    match expr {
        Expr::Column(c) => {
            let index = c
                .index
                .ok_or_else(|| eval_error(format!("column '{}' is not bound", c.name)))?;
            row.get(index)
                .cloned()
                .ok_or_else(|| eval_error(format!("column '{}' is out of range", c.name)))
        }
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Type(_) => Err(eval_error("type name used as a value")),
        Expr::Aggregate { .. } => Err(eval_error("aggregates are only allowed in compute")),
        Expr::UnaryOp { op, expr } => {
            let v = eval(expr, row, ctx)?;
            match op {
                UnaryOp::Not => Ok(truth(&v)?.map(|b| Value::Boolean(!b)).unwrap_or(Value::Null)),
                UnaryOp::Neg => negate(v),
            }
        }
        Expr::IsNull { expr, negated } => {
            let v = eval(expr, row, ctx)?;
            Ok(Value::Boolean(v.is_null() != *negated))
        }
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOp::And => {
                let l = truth(&eval(left, row, ctx)?)?;
                if l == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let r = truth(&eval(right, row, ctx)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOp::Or => {
                let l = truth(&eval(left, row, ctx)?)?;
                if l == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let r = truth(&eval(right, row, ctx)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            op if op.is_comparison() => {
                let l = eval(left, row, ctx)?;
                let r = eval(right, row, ctx)?;
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                let ord = compare(&l, &r, ctx.case_sensitive)?;
                Ok(Value::Boolean(match op {
                    BinaryOp::Eq => ord == Ordering::Equal,
                    BinaryOp::Ne => ord != Ordering::Equal,
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            op => {
                let l = eval(left, row, ctx)?;
                let r = eval(right, row, ctx)?;
                arithmetic(*op, l, r)
            }
        },
        Expr::Like {
            expr,
            pattern,
            negated,
        } => {
            let v = eval(expr, row, ctx)?;
            let p = eval(pattern, row, ctx)?;
            if v.is_null() || p.is_null() {
                return Ok(Value::Null);
            }
            let matched = like(&v.to_string(), &p.to_string(), ctx.case_sensitive);
            Ok(Value::Boolean(matched != *negated))
        }
        Expr::In {
            expr,
            list,
            negated,
        } => {
            let v = eval(expr, row, ctx)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            for item in list {
                let candidate = eval(item, row, ctx)?;
                if !candidate.is_null() && compare(&v, &candidate, ctx.case_sensitive)? == Ordering::Equal {
                    return Ok(Value::Boolean(!*negated));
                }
            }
            Ok(Value::Boolean(*negated))
        }
        Expr::Function { func, args } => call(*func, args, row, ctx),
    }
}

/// Converts a value to a truth value; null is unknown.
pub fn truth(v: &Value) -> Result<Option<bool>> {
    match v {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(eval_error(format!("'{}' is not a boolean", other))),
    }
}

/// Compares two non-null values, converting between types where defined.
pub fn compare(l: &Value, r: &Value, case_sensitive: bool) -> Result<Ordering> {
    if let (Some(a), Some(b)) = (l.to_i64(), r.to_i64()) {
        return Ok(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (l.to_f64(), r.to_f64()) {
        return Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal));
    }
    if l.data_type() == r.data_type() {
        return Ok(l.cmp_with_case(r, case_sensitive));
    }
    // Mixed types: convert the string side to the other side's type.
    let converted = match (l, r) {
        (Value::String(_), other) => other
            .data_type()
            .and_then(|t| l.coerce_to(t))
            .map(|lc| (lc, other.clone())),
        (other, Value::String(_)) => other
            .data_type()
            .and_then(|t| r.coerce_to(t))
            .map(|rc| (other.clone(), rc)),
        _ => None,
    };
    match converted {
        Some((a, b)) => compare(&a, &b, case_sensitive),
        None => Err(eval_error(format!("cannot compare '{}' with '{}'", l, r))),
    }
}

fn negate(v: Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Int32(x) => Ok(x.checked_neg().map(Value::Int32).unwrap_or(Value::Int64(-(x as i64)))),
        Value::Int64(x) => x
            .checked_neg()
            .map(Value::Int64)
            .ok_or_else(|| eval_error("integer overflow")),
        Value::Float64(x) => Ok(Value::Float64(-x)),
        other => Err(eval_error(format!("cannot negate '{}'", other))),
    }
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Add && (matches!(l, Value::String(_)) || matches!(r, Value::String(_))) {
        return Ok(Value::String(format!("{}{}", l, r)));
    }
    let both_i32 = matches!((&l, &r), (Value::Int32(_), Value::Int32(_)));
    if let (Some(a), Some(b)) = (l.to_i64(), r.to_i64()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(eval_error("division by zero"));
                }
                return Ok(Value::Float64(a as f64 / b as f64));
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(eval_error("division by zero"));
                }
                a.checked_rem(b)
            }
            _ => None,
        }
        .ok_or_else(|| eval_error("integer overflow"))?;
        if both_i32 {
            if let Ok(small) = i32::try_from(result) {
                return Ok(Value::Int32(small));
            }
        }
        return Ok(Value::Int64(result));
    }
    if let (Some(a), Some(b)) = (l.to_f64(), r.to_f64()) {
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == 0.0 {
                    return Err(eval_error("division by zero"));
                }
                a / b
            }
            BinaryOp::Mod => a % b,
            _ => return Err(eval_error("unsupported operator")),
        };
        return Ok(Value::Float64(result));
    }
    Err(eval_error(format!("cannot apply {:?} to '{}' and '{}'", op, l, r)))
}

fn call(func: Function, args: &[Expr], row: &[Value], ctx: EvalContext) -> Result<Value> {
    match func {
        Function::Len => match eval(&args[0], row, ctx)? {
            Value::Null => Ok(Value::Null),
            v => Ok(Value::Int32(v.to_string().chars().count() as i32)),
        },
        Function::Trim => match eval(&args[0], row, ctx)? {
            Value::Null => Ok(Value::Null),
            v => Ok(Value::String(v.to_string().trim().to_string())),
        },
        Function::Substring => {
            let s = eval(&args[0], row, ctx)?;
            if s.is_null() {
                return Ok(Value::Null);
            }
            let start = eval(&args[1], row, ctx)?
                .to_i64()
                .ok_or_else(|| eval_error("Substring start must be an integer"))?;
            let length = eval(&args[2], row, ctx)?
                .to_i64()
                .ok_or_else(|| eval_error("Substring length must be an integer"))?;
            if start < 1 || length < 0 {
                return Err(eval_error("Substring arguments out of range"));
            }
            let text = s.to_string();
            Ok(Value::String(
                text.chars().skip(start as usize - 1).take(length as usize).collect(),
            ))
        }
        Function::IsNull => {
            let v = eval(&args[0], row, ctx)?;
            if v.is_null() {
                eval(&args[1], row, ctx)
            } else {
                Ok(v)
            }
        }
        Function::Iif => {
            let cond = truth(&eval(&args[0], row, ctx)?)?;
            if cond == Some(true) {
                eval(&args[1], row, ctx)
            } else {
                eval(&args[2], row, ctx)
            }
        }
        Function::Convert => {
            let v = eval(&args[0], row, ctx)?;
            let target = match &args[1] {
                Expr::Type(t) => *t,
                _ => return Err(eval_error("Convert expects a type name")),
            };
            v.coerce_to(target)
                .ok_or_else(|| eval_error(format!("cannot convert '{}' to {}", v, target)))
        }
    }
}

use std::cmp::Ordering;

use regex::Regex;

use crate::error::EvalError;
use crate::value::Value;

fn coercion_error(op: &str, left: &Value, right: &Value) -> EvalError {
    match left {
        Value::Int { .. } | Value::Float { .. } => EvalError::raised(format!(
            "{} can't be coerced into {}",
            right.type_name(),
            left.type_name()
        )),
        Value::Str { .. } => {
            EvalError::raised(format!("no implicit conversion of {} into String", right.type_name()))
        }
        Value::Array { .. } => {
            EvalError::raised(format!("no implicit conversion of {} into Array", right.type_name()))
        }
        Value::Nil => EvalError::raised(format!("undefined method '{op}' for nil")),
        _ => EvalError::raised(format!("undefined method '{op}' for {}", left.type_name())),
    }
}

fn overflow_error(op: &str) -> EvalError {
    EvalError::raised(format!("integer overflow in '{op}'"))
}

pub(super) fn compile_regex(source: &str) -> Result<Regex, EvalError> {
    Regex::new(source).map_err(|_| EvalError::raised(format!("invalid regular expression: /{source}/")))
}

// Ruby's Integer#/ floors toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

// Ruby's modulo takes the sign of the divisor.
fn floor_mod_int(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn floor_mod_float(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

/// Ruby-comparable ordering. `None` means the two values do not compare.
pub(super) fn ruby_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int { i: x }, Value::Int { i: y }) => Some(x.cmp(y)),
        (Value::Float { f: x }, Value::Float { f: y }) => x.partial_cmp(y),
        (Value::Int { i }, Value::Float { f }) => (*i as f64).partial_cmp(f),
        (Value::Float { f }, Value::Int { i }) => f.partial_cmp(&(*i as f64)),
        (Value::Str { text: x }, Value::Str { text: y }) => Some(x.cmp(y)),
        (Value::Sym { text: x }, Value::Sym { text: y }) => Some(x.cmp(y)),
        (Value::Array { elements: x }, Value::Array { elements: y }) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                match ruby_cmp(ex, ey)? {
                    Ordering::Equal => {}
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

/// Whether `value` falls inside the range, Ruby `cover?` style. Nil
/// endpoints leave that side unbounded.
pub(super) fn range_cover(from: &Value, to: &Value, exclusive: bool, value: &Value) -> Result<bool, EvalError> {
    let lower_ok = match from {
        Value::Nil => true,
        bound => match ruby_cmp(bound, value) {
            Some(Ordering::Less) | Some(Ordering::Equal) => true,
            Some(Ordering::Greater) => false,
            None => return Ok(false),
        },
    };
    if !lower_ok {
        return Ok(false);
    }
    let upper_ok = match to {
        Value::Nil => true,
        bound => match ruby_cmp(value, bound) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => !exclusive,
            Some(Ordering::Greater) => false,
            None => return Ok(false),
        },
    };
    Ok(upper_ok)
}

pub fn operator_plus(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => {
            i1.checked_add(i2).map(Value::int).ok_or_else(|| overflow_error("+"))
        }

        (Value::Float { f: f1 }, Value::Float { f: f2 }) => Ok(Value::float(f1 + f2)),

        (Value::Int { i }, Value::Float { f }) | (Value::Float { f }, Value::Int { i }) => {
            Ok(Value::float(i as f64 + f))
        }

        (Value::Str { text: s1 }, Value::Str { text: s2 }) => Ok(Value::str(s1 + &s2)),

        (Value::Array { elements: mut e1 }, Value::Array { elements: e2 }) => {
            e1.extend(e2);
            Ok(Value::array(e1))
        }

        (v1, v2) => Err(coercion_error("+", &v1, &v2)),
    }
}

pub fn operator_minus(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => {
            i1.checked_sub(i2).map(Value::int).ok_or_else(|| overflow_error("-"))
        }

        (Value::Float { f: f1 }, Value::Float { f: f2 }) => Ok(Value::float(f1 - f2)),

        (Value::Int { i }, Value::Float { f }) => Ok(Value::float(i as f64 - f)),

        (Value::Float { f }, Value::Int { i }) => Ok(Value::float(f - i as f64)),

        (Value::Array { elements: e1 }, Value::Array { elements: e2 }) => {
            let kept = e1
                .into_iter()
                .filter(|x| !e2.iter().any(|y| x.ruby_eq(y)))
                .collect();
            Ok(Value::array(kept))
        }

        (v1, v2) => Err(coercion_error("-", &v1, &v2)),
    }
}

pub fn operator_mult(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => {
            i1.checked_mul(i2).map(Value::int).ok_or_else(|| overflow_error("*"))
        }

        (Value::Float { f: f1 }, Value::Float { f: f2 }) => Ok(Value::float(f1 * f2)),

        (Value::Int { i }, Value::Float { f }) | (Value::Float { f }, Value::Int { i }) => {
            Ok(Value::float(i as f64 * f))
        }

        (Value::Str { text }, Value::Int { i }) => {
            if i < 0 {
                return Err(EvalError::raised("negative argument"));
            }
            Ok(Value::str(text.repeat(i as usize)))
        }

        (Value::Array { elements }, Value::Int { i }) => {
            if i < 0 {
                return Err(EvalError::raised("negative argument"));
            }
            let mut out = Vec::with_capacity(elements.len() * i as usize);
            for _ in 0..i {
                out.extend(elements.iter().cloned());
            }
            Ok(Value::array(out))
        }

        (v1, v2) => Err(coercion_error("*", &v1, &v2)),
    }
}

pub fn operator_div(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { .. }, Value::Int { i: 0 }) => Err(EvalError::raised("divided by 0")),

        (Value::Int { i: i1 }, Value::Int { i: i2 }) => {
            floor_div(i1, i2).map(Value::int).ok_or_else(|| overflow_error("/"))
        }

        (Value::Float { f: f1 }, Value::Float { f: f2 }) => Ok(Value::float(f1 / f2)),

        (Value::Int { i }, Value::Float { f }) => Ok(Value::float(i as f64 / f)),

        (Value::Float { f }, Value::Int { i }) => Ok(Value::float(f / i as f64)),

        (v1, v2) => Err(coercion_error("/", &v1, &v2)),
    }
}

pub fn operator_rem(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { .. }, Value::Int { i: 0 }) => Err(EvalError::raised("divided by 0")),

        (Value::Int { i: i1 }, Value::Int { i: i2 }) => Ok(Value::int(floor_mod_int(i1, i2))),

        (Value::Float { f: f1 }, Value::Float { f: f2 }) => Ok(Value::float(floor_mod_float(f1, f2))),

        (Value::Int { i }, Value::Float { f }) => Ok(Value::float(floor_mod_float(i as f64, f))),

        (Value::Float { f }, Value::Int { i }) => Ok(Value::float(floor_mod_float(f, i as f64))),

        (v1, v2) => Err(coercion_error("%", &v1, &v2)),
    }
}

pub fn operator_pow(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: base }, Value::Int { i: exp }) => {
            if exp < 0 {
                Ok(Value::float((base as f64).powi(exp as i32)))
            } else if exp > u32::MAX as i64 {
                Err(overflow_error("**"))
            } else {
                base.checked_pow(exp as u32)
                    .map(Value::int)
                    .ok_or_else(|| overflow_error("**"))
            }
        }

        (Value::Float { f: base }, Value::Float { f: exp }) => Ok(Value::float(base.powf(exp))),

        (Value::Int { i }, Value::Float { f }) => Ok(Value::float((i as f64).powf(f))),

        (Value::Float { f }, Value::Int { i }) => Ok(Value::float(f.powi(i as i32))),

        (v1, v2) => Err(coercion_error("**", &v1, &v2)),
    }
}

pub fn operator_equal(v1: Value, v2: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(v1.ruby_eq(&v2)))
}

pub fn operator_not_equal(v1: Value, v2: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(!v1.ruby_eq(&v2)))
}

fn compare(op: &str, v1: Value, v2: Value) -> Result<Ordering, EvalError> {
    ruby_cmp(&v1, &v2).ok_or_else(|| {
        EvalError::raised(format!(
            "comparison of {} with {} failed in '{op}'",
            v1.type_name(),
            v2.type_name()
        ))
    })
}

pub fn operator_less(v1: Value, v2: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(compare("<", v1, v2)? == Ordering::Less))
}

pub fn operator_less_equal(v1: Value, v2: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(compare("<=", v1, v2)? != Ordering::Greater))
}

pub fn operator_greater(v1: Value, v2: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(compare(">", v1, v2)? == Ordering::Greater))
}

pub fn operator_greater_equal(v1: Value, v2: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(compare(">=", v1, v2)? != Ordering::Less))
}

pub fn operator_spaceship(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match ruby_cmp(&v1, &v2) {
        Some(Ordering::Less) => Ok(Value::int(-1)),
        Some(Ordering::Equal) => Ok(Value::int(0)),
        Some(Ordering::Greater) => Ok(Value::int(1)),
        None => Ok(Value::Nil),
    }
}

pub fn operator_bit_and(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => Ok(Value::int(i1 & i2)),

        (Value::Bool { b: b1 }, Value::Bool { b: b2 }) => Ok(Value::bool(b1 && b2)),

        (Value::Array { elements: e1 }, Value::Array { elements: e2 }) => {
            let mut out: Vec<Value> = vec![];
            for x in e1 {
                if e2.iter().any(|y| x.ruby_eq(y)) && !out.iter().any(|y| x.ruby_eq(y)) {
                    out.push(x);
                }
            }
            Ok(Value::array(out))
        }

        (v1, v2) => Err(coercion_error("&", &v1, &v2)),
    }
}

pub fn operator_bit_or(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => Ok(Value::int(i1 | i2)),

        (Value::Bool { b: b1 }, Value::Bool { b: b2 }) => Ok(Value::bool(b1 || b2)),

        (Value::Array { elements: e1 }, Value::Array { elements: e2 }) => {
            let mut out: Vec<Value> = vec![];
            for x in e1.into_iter().chain(e2) {
                if !out.iter().any(|y| x.ruby_eq(y)) {
                    out.push(x);
                }
            }
            Ok(Value::array(out))
        }

        (v1, v2) => Err(coercion_error("|", &v1, &v2)),
    }
}

pub fn operator_bit_xor(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => Ok(Value::int(i1 ^ i2)),

        (Value::Bool { b: b1 }, Value::Bool { b: b2 }) => Ok(Value::bool(b1 != b2)),

        (v1, v2) => Err(coercion_error("^", &v1, &v2)),
    }
}

pub fn operator_shift_left(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => {
            if i2 < 0 {
                return operator_shift_right(Value::int(i1), Value::int(-i2));
            }
            if i2 >= 63 {
                return Err(overflow_error("<<"));
            }
            let shifted = i1 << i2;
            if shifted >> i2 != i1 {
                return Err(overflow_error("<<"));
            }
            Ok(Value::int(shifted))
        }

        (Value::Array { mut elements }, pushed) => {
            elements.push(pushed);
            Ok(Value::array(elements))
        }

        (Value::Str { text: mut s1 }, Value::Str { text: s2 }) => {
            s1.push_str(&s2);
            Ok(Value::str(s1))
        }

        (v1, v2) => Err(coercion_error("<<", &v1, &v2)),
    }
}

pub fn operator_shift_right(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Int { i: i1 }, Value::Int { i: i2 }) => {
            if i2 < 0 {
                return operator_shift_left(Value::int(i1), Value::int(-i2));
            }
            Ok(Value::int(if i2 >= 63 { i1 >> 63 } else { i1 >> i2 }))
        }

        (v1, v2) => Err(coercion_error(">>", &v1, &v2)),
    }
}

/// `=~` between a string and a regex in either order: the character index
/// of the first match, or nil.
pub fn operator_match(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (v1, v2) {
        (Value::Str { text }, Value::Regexp { source }) | (Value::Regexp { source }, Value::Str { text }) => {
            let re = compile_regex(&source)?;
            Ok(match re.find(&text) {
                Some(m) => Value::int(text[..m.start()].chars().count() as i64),
                None => Value::Nil,
            })
        }

        (Value::Regexp { .. }, other) => Err(EvalError::raised(format!(
            "type mismatch: {} given",
            other.type_name()
        ))),

        _ => Ok(Value::Nil),
    }
}

pub fn operator_not_match(v1: Value, v2: Value) -> Result<Value, EvalError> {
    let matched = operator_match(v1, v2)?;
    Ok(Value::bool(!matched.is_truthy()))
}

/// Ruby case equality: regexes match, ranges cover, everything else `==`.
pub fn operator_case_equal(v1: Value, v2: Value) -> Result<Value, EvalError> {
    match (&v1, &v2) {
        (Value::Regexp { source }, Value::Str { text }) => {
            let re = compile_regex(source)?;
            Ok(Value::bool(re.is_match(text)))
        }
        (Value::Range { from, to, exclusive }, value) => {
            Ok(Value::bool(range_cover(from, to, *exclusive, value)?))
        }
        _ => operator_equal(v1, v2),
    }
}

pub fn operator_not(v: Value) -> Result<Value, EvalError> {
    Ok(Value::bool(!v.is_truthy()))
}

pub fn operator_negation(v: Value) -> Result<Value, EvalError> {
    match v {
        Value::Int { i } => i.checked_neg().map(Value::int).ok_or_else(|| overflow_error("-")),
        Value::Float { f } => Ok(Value::float(-f)),
        v => Err(EvalError::raised(format!("undefined method '-@' for {}", v.type_name()))),
    }
}

pub fn operator_unary_plus(v: Value) -> Result<Value, EvalError> {
    match v {
        Value::Int { .. } | Value::Float { .. } => Ok(v),
        v => Err(EvalError::raised(format!("undefined method '+@' for {}", v.type_name()))),
    }
}

pub fn operator_complement(v: Value) -> Result<Value, EvalError> {
    match v {
        Value::Int { i } => Ok(Value::int(!i)),
        v => Err(EvalError::raised(format!("undefined method '~' for {}", v.type_name()))),
    }
}

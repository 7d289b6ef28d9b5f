
use super::operator_functions::{compile_regex, operator_plus, range_cover, ruby_cmp};
use super::{MethodEntry, MethodFunction, MethodFunctions};
use crate::error::EvalError;
use crate::value::Value;

const VARIADIC: usize = usize::MAX;

fn entry(min_args: usize, max_args: usize, func: MethodFunction) -> MethodEntry {
    MethodEntry {
        min_args,
        max_args,
        func,
    }
}

pub fn build_method_functions() -> MethodFunctions {
    let mut methods = MethodFunctions::new();
    let mut add = |name: &str, e: MethodEntry| {
        methods.insert(name.to_string(), e);
    };

    add("length", entry(0, 0, method_length));
    add("size", entry(0, 0, method_length));
    add("count", entry(0, 1, method_count));
    add("empty?", entry(0, 0, method_empty));
    add("include?", entry(1, 1, method_include));
    add("member?", entry(1, 1, method_include));
    add("key?", entry(1, 1, method_has_key));
    add("has_key?", entry(1, 1, method_has_key));
    add("fetch", entry(1, 2, method_fetch));
    add("first", entry(0, 1, method_first));
    add("last", entry(0, 1, method_last));
    add("min", entry(0, 0, method_min));
    add("max", entry(0, 0, method_max));
    add("sum", entry(0, 0, method_sum));
    add("sort", entry(0, 0, method_sort));
    add("reverse", entry(0, 0, method_reverse));
    add("uniq", entry(0, 0, method_uniq));
    add("compact", entry(0, 0, method_compact));
    add("flatten", entry(0, 0, method_flatten));
    add("join", entry(0, 1, method_join));
    add("index", entry(1, 1, method_index));
    add("take", entry(1, 1, method_take));
    add("drop", entry(1, 1, method_drop));
    add("keys", entry(0, 0, method_keys));
    add("values", entry(0, 0, method_values));

    add("abs", entry(0, 0, method_abs));
    add("zero?", entry(0, 0, method_zero));
    add("positive?", entry(0, 0, method_positive));
    add("negative?", entry(0, 0, method_negative));
    add("even?", entry(0, 0, method_even));
    add("odd?", entry(0, 0, method_odd));
    add("succ", entry(0, 0, method_succ));
    add("next", entry(0, 0, method_succ));
    add("pred", entry(0, 0, method_pred));
    add("round", entry(0, 1, method_round));
    add("floor", entry(0, 0, method_floor));
    add("ceil", entry(0, 0, method_ceil));
    add("between?", entry(2, 2, method_between));

    add("to_i", entry(0, 0, method_to_i));
    add("to_f", entry(0, 0, method_to_f));
    add("to_s", entry(0, 0, method_to_s));
    add("to_sym", entry(0, 0, method_to_sym));
    add("to_a", entry(0, 0, method_to_a));
    add("inspect", entry(0, 0, method_inspect));
    add("nil?", entry(0, 0, method_nil));

    add("upcase", entry(0, 0, method_upcase));
    add("downcase", entry(0, 0, method_downcase));
    add("capitalize", entry(0, 0, method_capitalize));
    add("strip", entry(0, 0, method_strip));
    add("lstrip", entry(0, 0, method_lstrip));
    add("rstrip", entry(0, 0, method_rstrip));
    add("chomp", entry(0, 1, method_chomp));
    add("chars", entry(0, 0, method_chars));
    add("split", entry(0, 1, method_split));
    add("start_with?", entry(1, VARIADIC, method_start_with));
    add("end_with?", entry(1, VARIADIC, method_end_with));
    add("sub", entry(2, 2, method_sub));
    add("gsub", entry(2, 2, method_gsub));
    add("match", entry(1, 1, method_match));
    add("match?", entry(1, 1, method_match_p));
    add("source", entry(0, 0, method_source));

    add("any?", entry(0, 0, method_any));
    add("all?", entry(0, 0, method_all));
    add("none?", entry(0, 0, method_none));

    methods
}

fn wrong_receiver(name: &str, receiver: &Value) -> EvalError {
    EvalError::raised(format!(
        "undefined method '{name}' for an instance of {}",
        receiver.type_name()
    ))
}

/// Materialize a range as elements, guarding against absurd expansions.
pub(super) fn expand_range(from: &Value, to: &Value, exclusive: bool) -> Result<Vec<Value>, EvalError> {
    match (from, to) {
        (Value::Int { i: a }, Value::Int { i: b }) => {
            let upper = if exclusive { *b - 1 } else { *b };
            if upper < *a {
                return Ok(vec![]);
            }
            let count = upper - *a + 1;
            if count > 100_000 {
                return Err(EvalError::raised("range too large to expand"));
            }
            Ok((*a..=upper).map(Value::int).collect())
        }
        _ => Err(EvalError::raised("cannot expand a non-integer range")),
    }
}

fn method_length(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Str { text } => Ok(Value::int(text.chars().count() as i64)),
        Value::Array { elements } => Ok(Value::int(elements.len() as i64)),
        Value::Hash { pairs } => Ok(Value::int(pairs.len() as i64)),
        Value::Range { from, to, exclusive } => {
            Ok(Value::int(expand_range(from, to, *exclusive)?.len() as i64))
        }
        v => Err(wrong_receiver("length", v)),
    }
}

fn method_count(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match (receiver, args.first()) {
        (Value::Array { elements }, None) => Ok(Value::int(elements.len() as i64)),
        (Value::Array { elements }, Some(wanted)) => {
            Ok(Value::int(elements.iter().filter(|e| e.ruby_eq(wanted)).count() as i64))
        }
        (Value::Hash { pairs }, None) => Ok(Value::int(pairs.len() as i64)),
        (v, _) => Err(wrong_receiver("count", v)),
    }
}

fn method_empty(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Str { text } => Ok(Value::bool(text.is_empty())),
        Value::Array { elements } => Ok(Value::bool(elements.is_empty())),
        Value::Hash { pairs } => Ok(Value::bool(pairs.is_empty())),
        v => Err(wrong_receiver("empty?", v)),
    }
}

fn method_include(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let wanted = &args[0];
    match receiver {
        Value::Str { text } => match wanted {
            Value::Str { text: sub } => Ok(Value::bool(text.contains(sub.as_str()))),
            other => Err(EvalError::raised(format!(
                "no implicit conversion of {} into String",
                other.type_name()
            ))),
        },
        Value::Array { elements } => Ok(Value::bool(elements.iter().any(|e| e.ruby_eq(wanted)))),
        Value::Hash { pairs } => Ok(Value::bool(pairs.iter().any(|(k, _)| k.ruby_eq(wanted)))),
        Value::Range { from, to, exclusive } => {
            Ok(Value::bool(range_cover(from, to, *exclusive, wanted)?))
        }
        v => Err(wrong_receiver("include?", v)),
    }
}

fn method_has_key(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Hash { pairs } => Ok(Value::bool(pairs.iter().any(|(k, _)| k.ruby_eq(&args[0])))),
        v => Err(wrong_receiver("key?", v)),
    }
}

fn method_fetch(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Hash { pairs } => {
            if let Some((_, v)) = pairs.iter().find(|(k, _)| k.ruby_eq(&args[0])) {
                return Ok(v.clone());
            }
            match args.get(1) {
                Some(default) => Ok(default.clone()),
                None => Err(EvalError::raised(format!("key not found: {}", args[0].inspect()))),
            }
        }
        Value::Array { elements } => {
            let len = elements.len() as i64;
            if let Value::Int { i } = args[0] {
                let idx = if i < 0 { i + len } else { i };
                if idx >= 0 && idx < len {
                    return Ok(elements[idx as usize].clone());
                }
                match args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(EvalError::raised(format!(
                        "index {i} outside of array bounds: {}...{len}",
                        -len
                    ))),
                }
            } else {
                Err(EvalError::raised(format!(
                    "no implicit conversion of {} into Integer",
                    args[0].type_name()
                )))
            }
        }
        v => Err(wrong_receiver("fetch", v)),
    }
}

fn method_first(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match (receiver, args.first()) {
        (Value::Array { elements }, None) => Ok(elements.first().cloned().unwrap_or(Value::Nil)),
        (Value::Array { elements }, Some(Value::Int { i })) => {
            let n = (*i).max(0) as usize;
            Ok(Value::array(elements.iter().take(n).cloned().collect()))
        }
        (Value::Range { from, .. }, None) => Ok((**from).clone()),
        (v, _) => Err(wrong_receiver("first", v)),
    }
}

fn method_last(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match (receiver, args.first()) {
        (Value::Array { elements }, None) => Ok(elements.last().cloned().unwrap_or(Value::Nil)),
        (Value::Array { elements }, Some(Value::Int { i })) => {
            let n = (*i).max(0) as usize;
            let skip = elements.len().saturating_sub(n);
            Ok(Value::array(elements.iter().skip(skip).cloned().collect()))
        }
        (Value::Range { to, .. }, None) => Ok((**to).clone()),
        (v, _) => Err(wrong_receiver("last", v)),
    }
}

fn extreme(elements: &[Value], want_max: bool) -> Result<Value, EvalError> {
    let mut best: Option<&Value> = None;
    for element in elements {
        match best {
            None => best = Some(element),
            Some(current) => {
                let ordering = ruby_cmp(element, current)
                    .ok_or_else(|| EvalError::raised("comparison failed"))?;
                let replace = if want_max {
                    ordering == std::cmp::Ordering::Greater
                } else {
                    ordering == std::cmp::Ordering::Less
                };
                if replace {
                    best = Some(element);
                }
            }
        }
    }
    Ok(best.cloned().unwrap_or(Value::Nil))
}

fn method_min(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => extreme(elements, false),
        Value::Range { from, to, exclusive } => extreme(&expand_range(from, to, *exclusive)?, false),
        v => Err(wrong_receiver("min", v)),
    }
}

fn method_max(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => extreme(elements, true),
        Value::Range { from, to, exclusive } => extreme(&expand_range(from, to, *exclusive)?, true),
        v => Err(wrong_receiver("max", v)),
    }
}

pub(super) fn sum_values(elements: &[Value]) -> Result<Value, EvalError> {
    let mut total = Value::int(0);
    for element in elements {
        total = operator_plus(total, element.clone())?;
    }
    Ok(total)
}

fn method_sum(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => sum_values(elements),
        Value::Range { from, to, exclusive } => sum_values(&expand_range(from, to, *exclusive)?),
        v => Err(wrong_receiver("sum", v)),
    }
}

fn method_sort(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => {
            let mut sorted = elements.clone();
            let mut failed = false;
            sorted.sort_by(|a, b| {
                ruby_cmp(a, b).unwrap_or_else(|| {
                    failed = true;
                    std::cmp::Ordering::Equal
                })
            });
            if failed {
                return Err(EvalError::raised("comparison failed"));
            }
            Ok(Value::array(sorted))
        }
        v => Err(wrong_receiver("sort", v)),
    }
}

fn method_reverse(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(Value::array(elements.iter().rev().cloned().collect())),
        Value::Str { text } => Ok(Value::str(text.chars().rev().collect::<String>())),
        v => Err(wrong_receiver("reverse", v)),
    }
}

fn method_uniq(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => {
            let mut out: Vec<Value> = vec![];
            for element in elements {
                if !out.iter().any(|e| e.ruby_eq(element)) {
                    out.push(element.clone());
                }
            }
            Ok(Value::array(out))
        }
        v => Err(wrong_receiver("uniq", v)),
    }
}

fn method_compact(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(Value::array(
            elements.iter().filter(|e| !matches!(e, Value::Nil)).cloned().collect(),
        )),
        v => Err(wrong_receiver("compact", v)),
    }
}

fn flatten_into(elements: &[Value], out: &mut Vec<Value>) {
    for element in elements {
        match element {
            Value::Array { elements: inner } => flatten_into(inner, out),
            other => out.push(other.clone()),
        }
    }
}

fn method_flatten(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => {
            let mut out = vec![];
            flatten_into(elements, &mut out);
            Ok(Value::array(out))
        }
        v => Err(wrong_receiver("flatten", v)),
    }
}

fn join_into(elements: &[Value], separator: &str, parts: &mut Vec<String>) {
    for element in elements {
        match element {
            Value::Array { elements: inner } => join_into(inner, separator, parts),
            other => parts.push(other.to_display_string()),
        }
    }
}

fn method_join(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let separator = match args.first() {
        None => String::new(),
        Some(Value::Str { text }) => text.clone(),
        Some(other) => {
            return Err(EvalError::raised(format!(
                "no implicit conversion of {} into String",
                other.type_name()
            )))
        }
    };
    match receiver {
        Value::Array { elements } => {
            let mut parts = vec![];
            join_into(elements, &separator, &mut parts);
            Ok(Value::str(parts.join(&separator)))
        }
        v => Err(wrong_receiver("join", v)),
    }
}

fn method_index(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(elements
            .iter()
            .position(|e| e.ruby_eq(&args[0]))
            .map(|p| Value::int(p as i64))
            .unwrap_or(Value::Nil)),
        Value::Str { text } => match &args[0] {
            Value::Str { text: sub } => Ok(text
                .find(sub.as_str())
                .map(|pos| Value::int(text[..pos].chars().count() as i64))
                .unwrap_or(Value::Nil)),
            other => Err(EvalError::raised(format!(
                "no implicit conversion of {} into String",
                other.type_name()
            ))),
        },
        v => Err(wrong_receiver("index", v)),
    }
}

fn sized_arg(name: &str, args: &[Value]) -> Result<usize, EvalError> {
    match &args[0] {
        Value::Int { i } if *i >= 0 => Ok(*i as usize),
        Value::Int { .. } => Err(EvalError::raised(format!("attempt to {name} negative size"))),
        other => Err(EvalError::raised(format!(
            "no implicit conversion of {} into Integer",
            other.type_name()
        ))),
    }
}

fn method_take(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let n = sized_arg("take", args)?;
    match receiver {
        Value::Array { elements } => Ok(Value::array(elements.iter().take(n).cloned().collect())),
        v => Err(wrong_receiver("take", v)),
    }
}

fn method_drop(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let n = sized_arg("drop", args)?;
    match receiver {
        Value::Array { elements } => Ok(Value::array(elements.iter().skip(n).cloned().collect())),
        v => Err(wrong_receiver("drop", v)),
    }
}

fn method_keys(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Hash { pairs } => Ok(Value::array(pairs.iter().map(|(k, _)| k.clone()).collect())),
        v => Err(wrong_receiver("keys", v)),
    }
}

fn method_values(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Hash { pairs } => Ok(Value::array(pairs.iter().map(|(_, v)| v.clone()).collect())),
        v => Err(wrong_receiver("values", v)),
    }
}

fn method_abs(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => i
            .checked_abs()
            .map(Value::int)
            .ok_or_else(|| EvalError::raised("integer overflow in 'abs'")),
        Value::Float { f } => Ok(Value::float(f.abs())),
        v => Err(wrong_receiver("abs", v)),
    }
}

fn method_zero(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::bool(*i == 0)),
        Value::Float { f } => Ok(Value::bool(*f == 0.0)),
        v => Err(wrong_receiver("zero?", v)),
    }
}

fn method_positive(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::bool(*i > 0)),
        Value::Float { f } => Ok(Value::bool(*f > 0.0)),
        v => Err(wrong_receiver("positive?", v)),
    }
}

fn method_negative(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::bool(*i < 0)),
        Value::Float { f } => Ok(Value::bool(*f < 0.0)),
        v => Err(wrong_receiver("negative?", v)),
    }
}

fn method_even(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::bool(i % 2 == 0)),
        v => Err(wrong_receiver("even?", v)),
    }
}

fn method_odd(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::bool(i % 2 != 0)),
        v => Err(wrong_receiver("odd?", v)),
    }
}

fn method_succ(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => i
            .checked_add(1)
            .map(Value::int)
            .ok_or_else(|| EvalError::raised("integer overflow in 'succ'")),
        v => Err(wrong_receiver("succ", v)),
    }
}

fn method_pred(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => i
            .checked_sub(1)
            .map(Value::int)
            .ok_or_else(|| EvalError::raised("integer overflow in 'pred'")),
        v => Err(wrong_receiver("pred", v)),
    }
}

fn float_to_int(f: f64, method: &str) -> Result<Value, EvalError> {
    if !f.is_finite() || f.abs() >= i64::MAX as f64 {
        return Err(EvalError::raised(format!("{method}: float out of integer range")));
    }
    Ok(Value::int(f as i64))
}

fn method_round(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::int(*i)),
        Value::Float { f } => match args.first() {
            None | Some(Value::Int { i: 0 }) => float_to_int(f.round(), "round"),
            Some(Value::Int { i }) if *i > 0 => {
                let factor = 10f64.powi(*i as i32);
                Ok(Value::float((f * factor).round() / factor))
            }
            Some(other) => Err(EvalError::raised(format!(
                "no implicit conversion of {} into Integer",
                other.type_name()
            ))),
        },
        v => Err(wrong_receiver("round", v)),
    }
}

fn method_floor(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::int(*i)),
        Value::Float { f } => float_to_int(f.floor(), "floor"),
        v => Err(wrong_receiver("floor", v)),
    }
}

fn method_ceil(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::int(*i)),
        Value::Float { f } => float_to_int(f.ceil(), "ceil"),
        v => Err(wrong_receiver("ceil", v)),
    }
}

fn method_between(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let low = ruby_cmp(receiver, &args[0]);
    let high = ruby_cmp(receiver, &args[1]);
    match (low, high) {
        (Some(l), Some(h)) => Ok(Value::bool(
            l != std::cmp::Ordering::Less && h != std::cmp::Ordering::Greater,
        )),
        _ => Err(EvalError::raised(format!(
            "comparison of {} with {} failed",
            receiver.type_name(),
            args[0].type_name()
        ))),
    }
}

fn leading_int(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let mut chars = trimmed.chars().peekable();
    let mut digits = String::new();
    if matches!(chars.peek(), Some('+') | Some('-')) {
        digits.push(chars.next().unwrap_or('+'));
    }
    for c in chars {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == '_' && digits.chars().last().is_some_and(|d| d.is_ascii_digit()) {
            continue;
        } else {
            break;
        }
    }
    digits.parse().unwrap_or(0)
}

fn leading_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut seen_dot = false;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_digit() {
            end += 1;
        } else if b == b'.' && !seen_dot && end + 1 < bytes.len() && bytes[end + 1].is_ascii_digit() {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0.0)
}

fn method_to_i(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::int(*i)),
        Value::Float { f } => float_to_int(f.trunc(), "to_i"),
        Value::Str { text } => Ok(Value::int(leading_int(text))),
        Value::Nil => Ok(Value::int(0)),
        v => Err(wrong_receiver("to_i", v)),
    }
}

fn method_to_f(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Int { i } => Ok(Value::float(*i as f64)),
        Value::Float { f } => Ok(Value::float(*f)),
        Value::Str { text } => Ok(Value::float(leading_float(text))),
        Value::Nil => Ok(Value::float(0.0)),
        v => Err(wrong_receiver("to_f", v)),
    }
}

fn method_to_s(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { .. } | Value::Hash { .. } => Ok(Value::str(receiver.inspect())),
        other => Ok(Value::str(other.to_display_string())),
    }
}

fn method_to_sym(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Str { text } => Ok(Value::sym(text.clone())),
        Value::Sym { text } => Ok(Value::sym(text.clone())),
        v => Err(wrong_receiver("to_sym", v)),
    }
}

fn method_to_a(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(Value::array(elements.clone())),
        Value::Hash { pairs } => Ok(Value::array(
            pairs
                .iter()
                .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        Value::Range { from, to, exclusive } => Ok(Value::array(expand_range(from, to, *exclusive)?)),
        Value::Nil => Ok(Value::array(vec![])),
        v => Err(wrong_receiver("to_a", v)),
    }
}

fn method_inspect(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::str(receiver.inspect()))
}

fn method_nil(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::bool(matches!(receiver, Value::Nil)))
}

fn string_method(name: &str, receiver: &Value, f: impl Fn(&str) -> String) -> Result<Value, EvalError> {
    match receiver {
        Value::Str { text } => Ok(Value::str(f(text))),
        v => Err(wrong_receiver(name, v)),
    }
}

fn method_upcase(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    string_method("upcase", receiver, |s| s.to_uppercase())
}

fn method_downcase(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    string_method("downcase", receiver, |s| s.to_lowercase())
}

fn method_capitalize(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    string_method("capitalize", receiver, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        }
    })
}

fn method_strip(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    string_method("strip", receiver, |s| s.trim().to_string())
}

fn method_lstrip(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    string_method("lstrip", receiver, |s| s.trim_start().to_string())
}

fn method_rstrip(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    string_method("rstrip", receiver, |s| s.trim_end().to_string())
}

fn method_chomp(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Str { text } => match args.first() {
            None => Ok(Value::str(
                text.strip_suffix("\r\n")
                    .or_else(|| text.strip_suffix('\n'))
                    .or_else(|| text.strip_suffix('\r'))
                    .unwrap_or(text)
                    .to_string(),
            )),
            Some(Value::Str { text: suffix }) => Ok(Value::str(
                text.strip_suffix(suffix.as_str()).unwrap_or(text).to_string(),
            )),
            Some(other) => Err(EvalError::raised(format!(
                "no implicit conversion of {} into String",
                other.type_name()
            ))),
        },
        v => Err(wrong_receiver("chomp", v)),
    }
}

fn method_chars(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Str { text } => Ok(Value::array(
            text.chars().map(|c| Value::str(c.to_string())).collect(),
        )),
        v => Err(wrong_receiver("chars", v)),
    }
}

fn drop_trailing_empties(mut parts: Vec<Value>) -> Vec<Value> {
    while matches!(parts.last(), Some(Value::Str { text }) if text.is_empty()) {
        parts.pop();
    }
    parts
}

fn method_split(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    let Value::Str { text } = receiver else {
        return Err(wrong_receiver("split", receiver));
    };
    match args.first() {
        None => Ok(Value::array(
            text.split_whitespace().map(Value::str).collect(),
        )),
        Some(Value::Str { text: sep }) if sep == " " => Ok(Value::array(
            text.split_whitespace().map(Value::str).collect(),
        )),
        Some(Value::Str { text: sep }) => Ok(Value::array(drop_trailing_empties(
            text.split(sep.as_str()).map(Value::str).collect(),
        ))),
        Some(Value::Regexp { source }) => {
            let re = compile_regex(source)?;
            Ok(Value::array(drop_trailing_empties(
                re.split(text).map(Value::str).collect(),
            )))
        }
        Some(other) => Err(EvalError::raised(format!(
            "wrong argument type {} (expected Regexp)",
            other.type_name()
        ))),
    }
}

fn affix_check(
    name: &str,
    receiver: &Value,
    args: &[Value],
    check: impl Fn(&str, &str) -> bool,
) -> Result<Value, EvalError> {
    let Value::Str { text } = receiver else {
        return Err(wrong_receiver(name, receiver));
    };
    for arg in args {
        match arg {
            Value::Str { text: affix } => {
                if check(text, affix) {
                    return Ok(Value::bool(true));
                }
            }
            other => {
                return Err(EvalError::raised(format!(
                    "no implicit conversion of {} into String",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::bool(false))
}

fn method_start_with(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    affix_check("start_with?", receiver, args, |text, affix| text.starts_with(affix))
}

fn method_end_with(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    affix_check("end_with?", receiver, args, |text, affix| text.ends_with(affix))
}

/// Ruby replacement escapes to the regex crate's: `\1` and `\&` become
/// capture references, a bare `$` must be doubled to stay literal.
fn convert_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let d = chars.next().unwrap_or('0');
                    out.push_str(&format!("${{{d}}}"));
                }
                Some('&') => {
                    chars.next();
                    out.push_str("${0}");
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

fn substitute(receiver: &Value, args: &[Value], all: bool, name: &str) -> Result<Value, EvalError> {
    let Value::Str { text } = receiver else {
        return Err(wrong_receiver(name, receiver));
    };
    let Value::Str { text: replacement } = &args[1] else {
        return Err(EvalError::raised(format!(
            "no implicit conversion of {} into String",
            args[1].type_name()
        )));
    };
    match &args[0] {
        Value::Str { text: pattern } => {
            let replaced = if all {
                text.replace(pattern.as_str(), replacement)
            } else {
                text.replacen(pattern.as_str(), replacement, 1)
            };
            Ok(Value::str(replaced))
        }
        Value::Regexp { source } => {
            let re = compile_regex(source)?;
            let converted = convert_replacement(replacement);
            let replaced = if all {
                re.replace_all(text, converted.as_str())
            } else {
                re.replace(text, converted.as_str())
            };
            Ok(Value::str(replaced.into_owned()))
        }
        other => Err(EvalError::raised(format!(
            "wrong argument type {} (expected Regexp)",
            other.type_name()
        ))),
    }
}

fn method_sub(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    substitute(receiver, args, false, "sub")
}

fn method_gsub(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    substitute(receiver, args, true, "gsub")
}

fn match_pair<'v>(receiver: &'v Value, args: &'v [Value], name: &str) -> Result<(&'v str, &'v str), EvalError> {
    match (receiver, &args[0]) {
        (Value::Str { text }, Value::Regexp { source }) | (Value::Regexp { source }, Value::Str { text }) => {
            Ok((text, source))
        }
        (v, _) => Err(wrong_receiver(name, v)),
    }
}

fn method_match(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    if let (Value::Str { text }, Value::Str { text: pattern }) = (receiver, &args[0]) {
        let re = compile_regex(&regex::escape(pattern))?;
        return Ok(match re.find(text) {
            Some(m) => Value::str(m.as_str().to_string()),
            None => Value::Nil,
        });
    }
    let (text, source) = match_pair(receiver, args, "match")?;
    let re = compile_regex(source)?;
    Ok(match re.find(text) {
        Some(m) => Value::str(m.as_str().to_string()),
        None => Value::Nil,
    })
}

fn method_match_p(receiver: &Value, args: &[Value]) -> Result<Value, EvalError> {
    if let (Value::Str { text }, Value::Str { text: pattern }) = (receiver, &args[0]) {
        return Ok(Value::bool(text.contains(pattern.as_str())));
    }
    let (text, source) = match_pair(receiver, args, "match?")?;
    let re = compile_regex(source)?;
    Ok(Value::bool(re.is_match(text)))
}

fn method_source(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Regexp { source } => Ok(Value::str(source.clone())),
        v => Err(wrong_receiver("source", v)),
    }
}

fn method_any(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(Value::bool(elements.iter().any(|e| e.is_truthy()))),
        Value::Hash { pairs } => Ok(Value::bool(!pairs.is_empty())),
        v => Err(wrong_receiver("any?", v)),
    }
}

fn method_all(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(Value::bool(elements.iter().all(|e| e.is_truthy()))),
        Value::Hash { .. } => Ok(Value::bool(true)),
        v => Err(wrong_receiver("all?", v)),
    }
}

fn method_none(receiver: &Value, _args: &[Value]) -> Result<Value, EvalError> {
    match receiver {
        Value::Array { elements } => Ok(Value::bool(!elements.iter().any(|e| e.is_truthy()))),
        Value::Hash { pairs } => Ok(Value::bool(pairs.is_empty())),
        v => Err(wrong_receiver("none?", v)),
    }
}

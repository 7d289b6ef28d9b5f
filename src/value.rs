use serde::{Deserialize, Serialize};

/// A Ruby value as the engine models it. Internally tagged so binding maps
/// round-trip through JSON with an explicit `kind` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Value {
    Nil,
    Bool { b: bool },
    Int { i: i64 },
    Float { f: f64 },
    Str { text: String },
    Sym { text: String },
    Regexp { source: String },
    Array { elements: Vec<Value> },
    Hash { pairs: Vec<(Value, Value)> },
    Range { from: Box<Value>, to: Box<Value>, exclusive: bool },
    Error { msg: String },
}

impl Value {
    pub fn bool(b: bool) -> Value {
        Value::Bool { b }
    }

    pub fn int(i: i64) -> Value {
        Value::Int { i }
    }

    pub fn float(f: f64) -> Value {
        Value::Float { f }
    }

    pub fn str(text: impl Into<String>) -> Value {
        Value::Str { text: text.into() }
    }

    pub fn sym(text: impl Into<String>) -> Value {
        Value::Sym { text: text.into() }
    }

    pub fn regexp(source: impl Into<String>) -> Value {
        Value::Regexp { source: source.into() }
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array { elements }
    }

    pub fn hash(pairs: Vec<(Value, Value)>) -> Value {
        Value::Hash { pairs }
    }

    pub fn range(from: Value, to: Value, exclusive: bool) -> Value {
        Value::Range {
            from: Box::new(from),
            to: Box::new(to),
            exclusive,
        }
    }

    pub fn error(msg: impl Into<String>) -> Value {
        Value::Error { msg: msg.into() }
    }

    /// Ruby truthiness. Error values count as falsy so a failed evaluation
    /// of a whole assertion body still flunks.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool { b: false } | Value::Error { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "NilClass",
            Value::Bool { b: true } => "TrueClass",
            Value::Bool { b: false } => "FalseClass",
            Value::Int { .. } => "Integer",
            Value::Float { .. } => "Float",
            Value::Str { .. } => "String",
            Value::Sym { .. } => "Symbol",
            Value::Regexp { .. } => "Regexp",
            Value::Array { .. } => "Array",
            Value::Hash { .. } => "Hash",
            Value::Range { .. } => "Range",
            Value::Error { .. } => "Error",
        }
    }

    /// Ruby `==` semantics: numeric values compare across Int/Float, hashes
    /// compare order-insensitively, everything else structurally.
    pub fn ruby_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool { b: a }, Value::Bool { b }) => a == b,
            (Value::Int { i: a }, Value::Int { i: b }) => a == b,
            (Value::Float { f: a }, Value::Float { f: b }) => a == b,
            (Value::Int { i }, Value::Float { f }) | (Value::Float { f }, Value::Int { i }) => *i as f64 == *f,
            (Value::Str { text: a }, Value::Str { text: b }) => a == b,
            (Value::Sym { text: a }, Value::Sym { text: b }) => a == b,
            (Value::Regexp { source: a }, Value::Regexp { source: b }) => a == b,
            (Value::Array { elements: a }, Value::Array { elements: b }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.ruby_eq(y))
            }
            (Value::Hash { pairs: a }, Value::Hash { pairs: b }) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(bk, bv)| k.ruby_eq(bk) && v.ruby_eq(bv))
                    })
            }
            (
                Value::Range { from: a, to: b, exclusive: x },
                Value::Range { from: c, to: d, exclusive: y },
            ) => x == y && a.ruby_eq(c) && b.ruby_eq(d),
            _ => false,
        }
    }

    /// Single-line `inspect` rendering.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool { b } => b.to_string(),
            Value::Int { i } => i.to_string(),
            Value::Float { f } => float_repr(*f),
            Value::Str { text } => quote_string(text),
            Value::Sym { text } => format!(":{text}"),
            Value::Regexp { source } => format!("/{source}/"),
            Value::Array { elements } => {
                let inner: Vec<String> = elements.iter().map(|e| e.inspect()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Hash { pairs } => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}=>{}", k.inspect(), v.inspect()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Range { from, to, exclusive } => {
                let dots = if *exclusive { "..." } else { ".." };
                format!("{}{dots}{}", from.inspect(), to.inspect())
            }
            Value::Error { msg } => format!("<error: {msg}>"),
        }
    }

    /// `to_s` as interpolation sees it.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Str { text } => text.clone(),
            Value::Sym { text } => text.clone(),
            Value::Regexp { source } => format!("(?-mix:{source})"),
            _ => self.inspect(),
        }
    }

    /// Multi-line rendering: the `inspect` form when it fits in `width`
    /// columns, otherwise containers break one element per line with the
    /// continuation aligned one column past the opening bracket.
    pub fn pretty(&self, width: usize) -> String {
        self.pretty_at(0, width)
    }

    fn pretty_at(&self, indent: usize, width: usize) -> String {
        let flat = self.inspect();
        if indent + flat.len() <= width {
            return flat;
        }
        match self {
            Value::Array { elements } if !elements.is_empty() => {
                let inner = indent + 1;
                let mut out = String::from("[");
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        out.push_str(",\n");
                        out.push_str(&" ".repeat(inner));
                    }
                    out.push_str(&element.pretty_at(inner, width));
                }
                out.push(']');
                out
            }
            Value::Hash { pairs } if !pairs.is_empty() => {
                let inner = indent + 1;
                let mut out = String::from("{");
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push_str(",\n");
                        out.push_str(&" ".repeat(inner));
                    }
                    let key = k.inspect();
                    out.push_str(&key);
                    out.push_str("=>");
                    out.push_str(&v.pretty_at(inner + key.len() + 2, width));
                }
                out.push('}');
                out
            }
            _ => flat,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::int(i)
                } else {
                    Value::float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::hash(
                map.into_iter().map(|(k, v)| (Value::str(k), Value::from(v))).collect(),
            ),
        }
    }
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn quote_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn inspect_scalars() {
        assert_eq!(Value::Nil.inspect(), "nil");
        assert_eq!(Value::bool(false).inspect(), "false");
        assert_eq!(Value::int(-3).inspect(), "-3");
        assert_eq!(Value::float(2.0).inspect(), "2.0");
        assert_eq!(Value::float(2.5).inspect(), "2.5");
        assert_eq!(Value::str("a\"b\n").inspect(), "\"a\\\"b\\n\"");
        assert_eq!(Value::sym("ok").inspect(), ":ok");
        assert_eq!(Value::regexp("ab+").inspect(), "/ab+/");
    }

    #[test]
    fn inspect_containers() {
        let arr = Value::array(vec![Value::int(1), Value::str("x")]);
        assert_eq!(arr.inspect(), "[1, \"x\"]");
        let hash = Value::hash(vec![(Value::sym("a"), Value::int(1))]);
        assert_eq!(hash.inspect(), "{:a=>1}");
        assert_eq!(Value::range(Value::int(1), Value::int(5), false).inspect(), "1..5");
        assert_eq!(Value::range(Value::int(1), Value::int(5), true).inspect(), "1...5");
        assert_eq!(Value::error("boom").inspect(), "<error: boom>");
    }

    #[test]
    fn truthiness() {
        assert!(Value::int(0).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::bool(false).is_truthy());
        assert!(!Value::error("x").is_truthy());
    }

    #[test]
    fn ruby_eq_crosses_numeric_kinds() {
        assert!(Value::int(1).ruby_eq(&Value::float(1.0)));
        assert!(!Value::int(1).ruby_eq(&Value::str("1")));
        let a = Value::hash(vec![
            (Value::sym("a"), Value::int(1)),
            (Value::sym("b"), Value::int(2)),
        ]);
        let b = Value::hash(vec![
            (Value::sym("b"), Value::int(2)),
            (Value::sym("a"), Value::int(1)),
        ]);
        assert!(a.ruby_eq(&b));
    }

    #[test]
    fn pretty_keeps_short_values_flat() {
        let arr = Value::array(vec![Value::int(1), Value::int(2)]);
        assert_eq!(arr.pretty(79), "[1, 2]");
    }

    #[test]
    fn pretty_breaks_long_arrays() {
        let arr = Value::array(vec![
            Value::str("aaaaaaaaaaaaaaaa"),
            Value::str("bbbbbbbbbbbbbbbb"),
            Value::int(3),
        ]);
        let expected = "[\"aaaaaaaaaaaaaaaa\",\n \"bbbbbbbbbbbbbbbb\",\n 3]";
        assert_eq!(arr.pretty(20), expected);
    }

    #[test]
    fn json_bindings_convert() {
        let json: serde_json::Value = serde_json::from_str(r#"{"n": 3, "s": "x", "a": [1, 2.5, null]}"#).unwrap();
        let value = Value::from(json);
        if let Value::Hash { pairs } = value {
            assert_eq!(pairs.len(), 3);
            assert_eq!(pairs[0], (Value::str("n"), Value::int(3)));
            assert_eq!(
                pairs[2].1,
                Value::array(vec![Value::int(1), Value::float(2.5), Value::Nil])
            );
        } else {
            panic!("expected a hash");
        }
    }
}

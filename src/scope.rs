use indexmap::IndexMap;

use crate::value::Value;

/// The caller-visible bindings, insertion-ordered. The engine only ever
/// reads it; statement evaluation layers scratch locals on top instead of
/// writing here.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }
}

impl FromIterator<(String, Value)> for Scope {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Scope {
            bindings: iter.into_iter().collect(),
        }
    }
}

/// Everything the reflection pass knows about the call site's bindings:
/// the lexical scope plus the latest block arguments, recorded as a side
/// channel because the reduced context has no live frames to read them from.
#[derive(Debug, Clone, Default)]
pub struct LexicalContext {
    pub scope: Scope,
    pub block_args: Option<Vec<Value>>,
}

impl LexicalContext {
    pub fn new(scope: Scope) -> LexicalContext {
        LexicalContext {
            scope,
            block_args: None,
        }
    }

    pub fn with_block_args(mut self, args: Vec<Value>) -> LexicalContext {
        self.block_args = Some(args);
        self
    }
}

/// Bind block parameter names to the recorded arguments positionally,
/// honoring Ruby's auto-splat: a single array argument destructures across
/// multiple declared names. Names without a matching argument stay unbound.
pub fn bind_block_args(names: &[String], args: &[Value]) -> Vec<(String, Value)> {
    let spread: Vec<Value> = if names.len() > 1 && args.len() == 1 {
        match &args[0] {
            Value::Array { elements } => elements.clone(),
            other => vec![other.clone()],
        }
    } else {
        args.to_vec()
    };
    names
        .iter()
        .zip(spread)
        .map(|(name, value)| (name.clone(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scope_keeps_insertion_order() {
        let mut scope = Scope::new();
        scope.bind("b", Value::int(2));
        scope.bind("a", Value::int(1));
        let order: Vec<&String> = scope.iter().map(|(k, _)| k).collect();
        assert_eq!(order, ["b", "a"]);
    }

    #[test]
    fn block_args_bind_positionally() {
        let bound = bind_block_args(&names(&["n"]), &[Value::int(-1)]);
        assert_eq!(bound, vec![("n".to_string(), Value::int(-1))]);
    }

    #[test]
    fn single_array_arg_destructures_over_many_names() {
        let arg = Value::array(vec![Value::int(1), Value::int(2)]);
        let bound = bind_block_args(&names(&["a", "b"]), &[arg]);
        assert_eq!(bound[0].1, Value::int(1));
        assert_eq!(bound[1].1, Value::int(2));
    }

    #[test]
    fn single_name_takes_the_array_whole() {
        let arg = Value::array(vec![Value::int(1), Value::int(2)]);
        let bound = bind_block_args(&names(&["a"]), &[arg.clone()]);
        assert_eq!(bound[0].1, arg);
    }

    #[test]
    fn extra_names_stay_unbound() {
        let bound = bind_block_args(&names(&["a", "b", "c"]), &[Value::int(1), Value::int(2)]);
        assert_eq!(bound.len(), 2);
    }
}

mod evaluator;
mod method_functions;
mod operator_functions;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use indexmap::IndexMap;

pub use evaluator::Evaluator;

use crate::error::EvalError;
use crate::scope::Scope;
use crate::value::Value;

// op(operand)
type UnaryOperatorFunction = fn(Value) -> Result<Value, EvalError>;
type UnaryOperatorFunctions = HashMap<String, UnaryOperatorFunction>;

// op(left_operand, right_operand)
type BinaryOperatorFunction = fn(Value, Value) -> Result<Value, EvalError>;
type BinaryOperatorFunctions = HashMap<String, BinaryOperatorFunction>;

// method(receiver, args)
type MethodFunction = fn(&Value, &[Value]) -> Result<Value, EvalError>;

#[derive(Clone)]
pub struct MethodEntry {
    pub min_args: usize,
    pub max_args: usize,
    pub func: MethodFunction,
}

type MethodFunctions = HashMap<String, MethodEntry>;

/// Name resolution layers: the caller's scope underneath, block-parameter
/// bindings above it, scratch locals from evaluated statements on top. Only
/// the scratch layer is ever written.
pub struct Bindings<'a> {
    base: &'a Scope,
    block: IndexMap<String, Value>,
    locals: IndexMap<String, Value>,
}

impl<'a> Bindings<'a> {
    pub fn new(base: &'a Scope) -> Bindings<'a> {
        Bindings {
            base,
            block: IndexMap::new(),
            locals: IndexMap::new(),
        }
    }

    pub fn with_block_bindings(base: &'a Scope, pairs: Vec<(String, Value)>) -> Bindings<'a> {
        Bindings {
            base,
            block: pairs.into_iter().collect(),
            locals: IndexMap::new(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .get(name)
            .or_else(|| self.block.get(name))
            .or_else(|| self.base.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn assign(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }

    /// Swap the scratch entry for `name`, returning the previous one so
    /// block-parameter shadowing can be undone after an element evaluation.
    pub fn replace_local(&mut self, name: &str, value: Option<Value>) -> Option<Value> {
        match value {
            Some(v) => self.locals.insert(name.to_string(), v),
            None => self.locals.shift_remove(name),
        }
    }
}

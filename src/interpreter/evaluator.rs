use std::collections::HashMap;

use tree_sitter::Node;

use crate::error::EvalError;
use crate::scope::bind_block_args;
use crate::source_loader::{block_body_statements, collect_parameter_names, node_text};
use crate::value::Value;

use super::method_functions::{build_method_functions, expand_range};
use super::operator_functions::{
    compile_regex, operator_bit_and, operator_bit_or, operator_bit_xor, operator_case_equal, operator_complement,
    operator_div, operator_equal, operator_greater, operator_greater_equal, operator_less, operator_less_equal,
    operator_match, operator_minus, operator_mult, operator_negation, operator_not, operator_not_equal,
    operator_not_match, operator_plus, operator_pow, operator_rem, operator_shift_left, operator_shift_right,
    operator_spaceship, operator_unary_plus,
};
use super::{Bindings, BinaryOperatorFunctions, MethodFunctions, UnaryOperatorFunctions};

/// Methods whose block we can actually run, by iterating the receiver's
/// elements and binding the block parameters per element.
const ITERATOR_METHODS: &[&str] = &[
    "map", "collect", "select", "filter", "reject", "find", "detect", "any?", "all?", "none?", "count", "sum",
    "each",
];

/// Evaluates parsed fragments directly against the recorded bindings. No
/// compilation step: assertion bodies are small and evaluated once each.
pub struct Evaluator {
    binary_op_functions: BinaryOperatorFunctions,
    unary_op_functions: UnaryOperatorFunctions,
    method_functions: MethodFunctions,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        let mut res = Self {
            binary_op_functions: HashMap::new(),
            unary_op_functions: HashMap::new(),
            method_functions: build_method_functions(),
        };

        res.unary_op_functions.insert("!".to_string(), operator_not);
        res.unary_op_functions.insert("not".to_string(), operator_not);
        res.unary_op_functions.insert("-".to_string(), operator_negation);
        res.unary_op_functions.insert("+".to_string(), operator_unary_plus);
        res.unary_op_functions.insert("~".to_string(), operator_complement);

        res.binary_op_functions.insert("+".to_string(), operator_plus);
        res.binary_op_functions.insert("-".to_string(), operator_minus);
        res.binary_op_functions.insert("*".to_string(), operator_mult);
        res.binary_op_functions.insert("/".to_string(), operator_div);
        res.binary_op_functions.insert("%".to_string(), operator_rem);
        res.binary_op_functions.insert("**".to_string(), operator_pow);

        res.binary_op_functions.insert("==".to_string(), operator_equal);
        res.binary_op_functions.insert("!=".to_string(), operator_not_equal);
        res.binary_op_functions.insert("<".to_string(), operator_less);
        res.binary_op_functions.insert("<=".to_string(), operator_less_equal);
        res.binary_op_functions.insert(">".to_string(), operator_greater);
        res.binary_op_functions.insert(">=".to_string(), operator_greater_equal);
        res.binary_op_functions.insert("<=>".to_string(), operator_spaceship);
        res.binary_op_functions.insert("===".to_string(), operator_case_equal);
        res.binary_op_functions.insert("=~".to_string(), operator_match);
        res.binary_op_functions.insert("!~".to_string(), operator_not_match);

        res.binary_op_functions.insert("&".to_string(), operator_bit_and);
        res.binary_op_functions.insert("|".to_string(), operator_bit_or);
        res.binary_op_functions.insert("^".to_string(), operator_bit_xor);
        res.binary_op_functions.insert("<<".to_string(), operator_shift_left);
        res.binary_op_functions.insert(">>".to_string(), operator_shift_right);

        res
    }

    /// Evaluate a sequence of statements, returning the last value. The
    /// scratch locals written by earlier statements stay visible to later
    /// ones, matching how the block body originally ran.
    pub fn evaluate_body(&self, statements: &[Node], source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let mut last = Value::Nil;
        for statement in statements {
            last = self.evaluate(*statement, source, bindings)?;
        }
        Ok(last)
    }

    pub fn evaluate(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        match node.kind() {
            "nil" => Ok(Value::Nil),
            "true" => Ok(Value::bool(true)),
            "false" => Ok(Value::bool(false)),
            "integer" => parse_integer(node_text(&node, source)),
            "float" => parse_float(node_text(&node, source)),
            "string" => Ok(Value::str(self.assemble_string(node, source, bindings, true)?)),
            "chained_string" => {
                let mut text = String::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    text.push_str(&self.assemble_string(child, source, bindings, true)?);
                }
                Ok(Value::str(text))
            }
            "character" => Ok(Value::str(character_text(node_text(&node, source)))),
            "simple_symbol" => Ok(Value::sym(node_text(&node, source).trim_start_matches(':'))),
            "delimited_symbol" => Ok(Value::sym(self.assemble_string(node, source, bindings, true)?)),
            "hash_key_symbol" | "bare_symbol" => Ok(Value::sym(node_text(&node, source))),
            "regex" => Ok(Value::regexp(self.assemble_string(node, source, bindings, false)?)),
            "string_array" | "symbol_array" => self.evaluate_word_array(node, source, bindings),
            "array" => {
                let (elements, _) = self.evaluate_arguments(Some(node), source, bindings)?;
                Ok(Value::array(elements))
            }
            "hash" => self.evaluate_hash(node, source, bindings),
            "pair" => {
                let (key, value) = self.evaluate_pair(node, source, bindings)?;
                Ok(Value::array(vec![key, value]))
            }
            "range" => self.evaluate_range(node, source, bindings),

            "identifier" => match bindings.lookup(node_text(&node, source)) {
                Some(value) => Ok(value.clone()),
                None => Err(EvalError::undefined_name(node_text(&node, source))),
            },
            "constant" => self.evaluate_constant(node_text(&node, source), bindings),
            "scope_resolution" => self.evaluate_constant(node_text(&node, source), bindings),
            "instance_variable" | "class_variable" | "global_variable" => {
                let name = node_text(&node, source);
                match bindings.lookup(name) {
                    Some(value) => Ok(value.clone()),
                    None => Err(EvalError::MissingBinding(format!(
                        "uninitialized {} {name}",
                        variable_kind_label(node.kind())
                    ))),
                }
            }
            "self" => match bindings.lookup("self") {
                Some(value) => Ok(value.clone()),
                None => Err(EvalError::InsufficientBindings("self is not recorded".to_string())),
            },

            "binary" => self.evaluate_binary(node, source, bindings),
            "unary" => self.evaluate_unary(node, source, bindings),
            "conditional" => {
                let condition = self.field(node, "condition")?;
                if self.evaluate(condition, source, bindings)?.is_truthy() {
                    self.evaluate(self.field(node, "consequence")?, source, bindings)
                } else {
                    self.evaluate(self.field(node, "alternative")?, source, bindings)
                }
            }

            "call" => self.evaluate_call(node, source, bindings),
            "element_reference" => self.evaluate_element_reference(node, source, bindings),

            "assignment" => self.evaluate_assignment(node, source, bindings),
            "operator_assignment" => self.evaluate_operator_assignment(node, source, bindings),

            "if" | "elsif" => self.evaluate_if(node, source, bindings, false),
            "unless" => self.evaluate_if(node, source, bindings, true),
            "if_modifier" => {
                let condition = self.field(node, "condition")?;
                if self.evaluate(condition, source, bindings)?.is_truthy() {
                    self.evaluate(self.field(node, "body")?, source, bindings)
                } else {
                    Ok(Value::Nil)
                }
            }
            "unless_modifier" => {
                let condition = self.field(node, "condition")?;
                if self.evaluate(condition, source, bindings)?.is_truthy() {
                    Ok(Value::Nil)
                } else {
                    self.evaluate(self.field(node, "body")?, source, bindings)
                }
            }
            "while" | "until" => {
                let condition = self.field(node, "condition")?;
                let body = self.field(node, "body")?;
                let until = node.kind() == "until";
                while self.evaluate(condition, source, bindings)?.is_truthy() != until {
                    self.evaluate(body, source, bindings)?;
                }
                Ok(Value::Nil)
            }
            "while_modifier" | "until_modifier" => {
                let condition = self.field(node, "condition")?;
                let body = self.field(node, "body")?;
                let until = node.kind() == "until_modifier";
                while self.evaluate(condition, source, bindings)?.is_truthy() != until {
                    self.evaluate(body, source, bindings)?;
                }
                Ok(Value::Nil)
            }
            "for" => self.evaluate_for(node, source, bindings),
            "case" => self.evaluate_case(node, source, bindings),

            "begin" => self.evaluate_begin(node, source, bindings),
            "rescue_modifier" => {
                let body = self.field(node, "body")?;
                match self.evaluate(body, source, bindings) {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_silent() => Err(e),
                    Err(_) => self.evaluate(self.field(node, "handler")?, source, bindings),
                }
            }

            "method" | "singleton_method" => {
                let name = self.field(node, "name")?;
                Ok(Value::sym(node_text(&name, source)))
            }
            "class" | "module" | "alias" | "undef" => Ok(Value::Nil),
            "lambda" => Err(EvalError::InsufficientBindings("proc values are not modeled".to_string())),
            "super" => Err(EvalError::InsufficientBindings(
                "super called outside of a method".to_string(),
            )),
            "yield" => Err(EvalError::raised("no block given (yield)")),
            "return" => Err(EvalError::raised("unexpected return")),
            "break" => Err(EvalError::raised("unexpected break")),
            "next" => Err(EvalError::raised("unexpected next")),
            "redo" => Err(EvalError::raised("unexpected redo")),
            "retry" => Err(EvalError::raised("unexpected retry")),

            "parenthesized_statements" | "program" | "then" | "else" | "do" | "block_body" | "body_statement" => {
                self.evaluate_statements(node, source, bindings)
            }
            "comment" | "empty_statement" => Ok(Value::Nil),

            kind => Err(EvalError::InsufficientBindings(format!(
                "cannot evaluate a '{kind}' node"
            ))),
        }
    }

    fn field<'t>(&self, node: Node<'t>, name: &str) -> Result<Node<'t>, EvalError> {
        node.child_by_field_name(name)
            .ok_or_else(|| EvalError::InsufficientBindings(format!("'{}' node without a {name}", node.kind())))
    }

    fn evaluate_statements(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let mut last = Value::Nil;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if matches!(child.kind(), "comment" | "empty_statement") {
                continue;
            }
            last = self.evaluate(child, source, bindings)?;
        }
        Ok(last)
    }

    /// Join string parts: literal content, escape sequences, interpolations.
    /// Regex sources keep escapes raw since the backslash belongs to the
    /// pattern, not to the literal.
    fn assemble_string(
        &self,
        node: Node,
        source: &str,
        bindings: &mut Bindings,
        unescape: bool,
    ) -> Result<String, EvalError> {
        let mut out = String::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "string_content" => out.push_str(node_text(&child, source)),
                "escape_sequence" => {
                    let raw = node_text(&child, source);
                    if unescape {
                        out.push_str(&unescape_sequence(raw));
                    } else {
                        out.push_str(raw);
                    }
                }
                "interpolation" => {
                    let value = self.evaluate_statements(child, source, bindings)?;
                    out.push_str(&value.to_display_string());
                }
                _ => out.push_str(node_text(&child, source)),
            }
        }
        Ok(out)
    }

    fn evaluate_word_array(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let symbols = node.kind() == "symbol_array";
        let mut elements = vec![];
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let text = self.assemble_string(child, source, bindings, true)?;
            elements.push(if symbols { Value::sym(text) } else { Value::str(text) });
        }
        Ok(Value::array(elements))
    }

    fn evaluate_hash(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let mut pairs = vec![];
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "pair" => pairs.push(self.evaluate_pair(child, source, bindings)?),
                "hash_splat_argument" => {
                    let inner = child
                        .named_child(0)
                        .ok_or_else(|| EvalError::raised("** without a value"))?;
                    match self.evaluate(inner, source, bindings)? {
                        Value::Hash { pairs: splatted } => pairs.extend(splatted),
                        other => {
                            return Err(EvalError::raised(format!(
                                "no implicit conversion of {} into Hash",
                                other.type_name()
                            )))
                        }
                    }
                }
                "comment" => {}
                _ => {
                    return Err(EvalError::InsufficientBindings(format!(
                        "cannot evaluate a '{}' hash entry",
                        child.kind()
                    )))
                }
            }
        }
        Ok(Value::hash(pairs))
    }

    fn evaluate_pair(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(Value, Value), EvalError> {
        let key_node = self.field(node, "key")?;
        let key = self.evaluate(key_node, source, bindings)?;
        let value = match node.child_by_field_name("value") {
            Some(value_node) => self.evaluate(value_node, source, bindings)?,
            // Shorthand `{x:}` takes the value from the binding of the same name.
            None => match bindings.lookup(node_text(&key_node, source)) {
                Some(v) => v.clone(),
                None => return Err(EvalError::undefined_name(node_text(&key_node, source))),
            },
        };
        Ok((key, value))
    }

    fn evaluate_range(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let from = match node.child_by_field_name("begin") {
            Some(begin) => self.evaluate(begin, source, bindings)?,
            None => Value::Nil,
        };
        let to = match node.child_by_field_name("end") {
            Some(end) => self.evaluate(end, source, bindings)?,
            None => Value::Nil,
        };
        let exclusive = node
            .child_by_field_name("operator")
            .map(|op| node_text(&op, source) == "...")
            .unwrap_or(false);
        Ok(Value::range(from, to, exclusive))
    }

    fn evaluate_constant(&self, name: &str, bindings: &Bindings) -> Result<Value, EvalError> {
        if let Some(value) = bindings.lookup(name) {
            return Ok(value.clone());
        }
        match name {
            "Float::INFINITY" => Ok(Value::float(f64::INFINITY)),
            "Float::NAN" => Ok(Value::float(f64::NAN)),
            _ => Err(EvalError::uninitialized_constant(name)),
        }
    }

    fn evaluate_binary(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let operator = node_text(&self.field(node, "operator")?, source).to_string();
        let left_node = self.field(node, "left")?;
        let right_node = self.field(node, "right")?;

        // The boolean operators are lazy and return the deciding operand.
        match operator.as_str() {
            "&&" | "and" => {
                let left = self.evaluate(left_node, source, bindings)?;
                return if left.is_truthy() {
                    self.evaluate(right_node, source, bindings)
                } else {
                    Ok(left)
                };
            }
            "||" | "or" => {
                let left = self.evaluate(left_node, source, bindings)?;
                return if left.is_truthy() {
                    Ok(left)
                } else {
                    self.evaluate(right_node, source, bindings)
                };
            }
            _ => {}
        }

        let left = self.evaluate(left_node, source, bindings)?;
        let right = self.evaluate(right_node, source, bindings)?;
        match self.binary_op_functions.get(&operator) {
            Some(op) => op(left, right),
            None => Err(EvalError::InsufficientBindings(format!(
                "operator '{operator}' is not modeled"
            ))),
        }
    }

    fn evaluate_unary(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let operator = node_text(&self.field(node, "operator")?, source).to_string();
        let operand = self.field(node, "operand")?;
        if operator == "defined?" {
            return self.evaluate_defined(operand, source, bindings);
        }
        let value = self.evaluate(operand, source, bindings)?;
        match self.unary_op_functions.get(&operator) {
            Some(op) => op(value),
            None => Err(EvalError::InsufficientBindings(format!(
                "operator '{operator}' is not modeled"
            ))),
        }
    }

    fn evaluate_defined(&self, operand: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let described = match operand.kind() {
            "identifier" => bindings.contains(node_text(&operand, source)).then_some("local-variable"),
            "instance_variable" => bindings
                .contains(node_text(&operand, source))
                .then_some("instance-variable"),
            "global_variable" => bindings
                .contains(node_text(&operand, source))
                .then_some("global-variable"),
            "constant" | "scope_resolution" => self
                .evaluate_constant(node_text(&operand, source), bindings)
                .ok()
                .map(|_| "constant"),
            "self" => Some("self"),
            _ => match self.evaluate(operand, source, bindings) {
                Ok(_) => Some("expression"),
                Err(_) => None,
            },
        };
        Ok(described.map(Value::str).unwrap_or(Value::Nil))
    }

    fn evaluate_if(
        &self,
        node: Node,
        source: &str,
        bindings: &mut Bindings,
        invert: bool,
    ) -> Result<Value, EvalError> {
        let condition = self.field(node, "condition")?;
        let taken = self.evaluate(condition, source, bindings)?.is_truthy() != invert;
        if taken {
            match node.child_by_field_name("consequence") {
                Some(consequence) => self.evaluate(consequence, source, bindings),
                None => Ok(Value::Nil),
            }
        } else {
            match node.child_by_field_name("alternative") {
                Some(alternative) => self.evaluate(alternative, source, bindings),
                None => Ok(Value::Nil),
            }
        }
    }

    fn evaluate_for(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let pattern = self.field(node, "pattern")?;
        let value_node = self.field(node, "value")?;
        let iterable_node = value_node
            .named_child(0)
            .ok_or_else(|| EvalError::InsufficientBindings("'for' without an iterable".to_string()))?;
        let iterable = self.evaluate(iterable_node, source, bindings)?;
        let elements = enumerable_elements(&iterable)?.ok_or_else(|| {
            EvalError::raised(format!(
                "undefined method 'each' for an instance of {}",
                iterable.type_name()
            ))
        })?;
        let body = self.field(node, "body")?;
        for element in elements {
            self.assign_to(pattern, element, source, bindings)?;
            self.evaluate(body, source, bindings)?;
        }
        Ok(iterable)
    }

    fn evaluate_case(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let subject = match node.child_by_field_name("value") {
            Some(value) => Some(self.evaluate(value, source, bindings)?),
            None => None,
        };
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "when" => {
                    if self.when_matches(child, &subject, source, bindings)? {
                        return match child.child_by_field_name("body") {
                            Some(body) => self.evaluate(body, source, bindings),
                            None => Ok(Value::Nil),
                        };
                    }
                }
                "else" => return self.evaluate_statements(child, source, bindings),
                _ => {}
            }
        }
        Ok(Value::Nil)
    }

    fn when_matches(
        &self,
        when: Node,
        subject: &Option<Value>,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<bool, EvalError> {
        let mut cursor = when.walk();
        for pattern in when.named_children(&mut cursor) {
            if matches!(pattern.kind(), "then" | "comment") {
                continue;
            }
            let candidates = if pattern.kind() == "splat_argument" {
                let inner = pattern
                    .named_child(0)
                    .ok_or_else(|| EvalError::raised("* without a value"))?;
                match self.evaluate(inner, source, bindings)? {
                    Value::Array { elements } => elements,
                    other => vec![other],
                }
            } else {
                vec![self.evaluate(pattern, source, bindings)?]
            };
            for candidate in candidates {
                let hit = match subject {
                    Some(subject) => operator_case_equal(candidate, subject.clone())?.is_truthy(),
                    None => candidate.is_truthy(),
                };
                if hit {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn evaluate_begin(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let mut statements = vec![];
        let mut rescues = vec![];
        let mut else_clause = None;
        let mut ensure_clause = None;
        collect_begin_parts(node, &mut statements, &mut rescues, &mut else_clause, &mut ensure_clause);

        let mut result = Ok(Value::Nil);
        for statement in statements {
            result = self.evaluate(statement, source, bindings);
            if result.is_err() {
                break;
            }
        }

        match result {
            Ok(value) => {
                result = match else_clause {
                    Some(else_node) => self.evaluate_statements(else_node, source, bindings),
                    None => Ok(value),
                };
            }
            Err(e) if !e.is_silent() => {
                // Exception classes are not modeled, so the first rescue
                // clause handles everything.
                result = match rescues.first() {
                    Some(rescue) => self.evaluate_rescue(*rescue, &e, source, bindings),
                    None => Err(e),
                };
            }
            Err(_) => {}
        }

        if let Some(ensure_node) = ensure_clause {
            self.evaluate_statements(ensure_node, source, bindings)?;
        }
        result
    }

    fn evaluate_rescue(
        &self,
        rescue: Node,
        error: &EvalError,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<Value, EvalError> {
        if let Some(variable) = rescue.child_by_field_name("variable") {
            if let Some(lhs) = variable.named_child(0) {
                self.assign_to(lhs, Value::error(error.message()), source, bindings)?;
            }
        }
        match rescue.child_by_field_name("body") {
            Some(body) => self.evaluate(body, source, bindings),
            None => Ok(Value::Nil),
        }
    }

    fn evaluate_assignment(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let right = self.evaluate(self.field(node, "right")?, source, bindings)?;
        self.assign_to(self.field(node, "left")?, right.clone(), source, bindings)?;
        Ok(right)
    }

    fn assign_to(&self, left: Node, value: Value, source: &str, bindings: &mut Bindings) -> Result<(), EvalError> {
        match left.kind() {
            "identifier" | "instance_variable" | "class_variable" | "global_variable" | "constant" => {
                bindings.assign(node_text(&left, source), value);
                Ok(())
            }
            "left_assignment_list" | "destructured_left_assignment" => {
                let elements = match value {
                    Value::Array { elements } => elements,
                    other => vec![other],
                };
                let mut cursor = left.walk();
                let targets: Vec<Node> = left.named_children(&mut cursor).collect();
                let mut index = 0;
                for target in &targets {
                    if target.kind() == "rest_assignment" {
                        let after = targets.len() - 1 - targets.iter().position(|t| t.id() == target.id()).unwrap_or(0);
                        let take = elements.len().saturating_sub(index + after);
                        let rest: Vec<Value> = elements.iter().skip(index).take(take).cloned().collect();
                        index += take;
                        if let Some(inner) = target.named_child(0) {
                            self.assign_to(inner, Value::array(rest), source, bindings)?;
                        }
                    } else {
                        let element = elements.get(index).cloned().unwrap_or(Value::Nil);
                        index += 1;
                        self.assign_to(*target, element, source, bindings)?;
                    }
                }
                Ok(())
            }
            "element_reference" => Err(EvalError::InsufficientBindings(
                "cannot assign into a recorded container".to_string(),
            )),
            kind => Err(EvalError::raised(format!("cannot assign to a '{kind}'"))),
        }
    }

    fn evaluate_operator_assignment(
        &self,
        node: Node,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<Value, EvalError> {
        let left = self.field(node, "left")?;
        let operator = node_text(&self.field(node, "operator")?, source).to_string();
        let right_node = self.field(node, "right")?;

        let current = match self.evaluate(left, source, bindings) {
            Ok(value) => value,
            // `x ||= v` and `x &&= v` tolerate an unbound left side.
            Err(EvalError::MissingBinding(_)) if operator == "||=" || operator == "&&=" => Value::Nil,
            Err(e) => return Err(e),
        };

        let updated = match operator.as_str() {
            "||=" => {
                if current.is_truthy() {
                    return Ok(current);
                }
                self.evaluate(right_node, source, bindings)?
            }
            "&&=" => {
                if !current.is_truthy() {
                    return Ok(current);
                }
                self.evaluate(right_node, source, bindings)?
            }
            _ => {
                let op = operator.trim_end_matches('=');
                let right = self.evaluate(right_node, source, bindings)?;
                match self.binary_op_functions.get(op) {
                    Some(func) => func(current, right)?,
                    None => {
                        return Err(EvalError::InsufficientBindings(format!(
                            "operator '{operator}' is not modeled"
                        )))
                    }
                }
            }
        };
        self.assign_to(left, updated.clone(), source, bindings)?;
        Ok(updated)
    }

    fn evaluate_call(&self, node: Node, source: &str, bindings: &mut Bindings) -> Result<Value, EvalError> {
        let method_node = self.field(node, "method")?;
        let method_name = node_text(&method_node, source).to_string();
        if method_node.kind() == "super" || method_name == "super" {
            return Err(EvalError::InsufficientBindings(
                "super called outside of a method".to_string(),
            ));
        }

        let block_node = node.child_by_field_name("block");
        let receiver_value = match node.child_by_field_name("receiver") {
            Some(receiver) => {
                let value = self.evaluate(receiver, source, bindings)?;
                let safe_navigation = node
                    .child_by_field_name("operator")
                    .map(|op| node_text(&op, source) == "&.")
                    .unwrap_or(false);
                if safe_navigation && matches!(value, Value::Nil) {
                    return Ok(Value::Nil);
                }
                value
            }
            // A receiverless call is a method of the original object, which
            // no longer exists here.
            None => return Err(EvalError::unknown_method("main", &method_name)),
        };
        let (args, sym_proc) = self.evaluate_arguments(node.child_by_field_name("arguments"), source, bindings)?;

        if block_node.is_some() || sym_proc.is_some() {
            if ITERATOR_METHODS.contains(&method_name.as_str()) {
                return self.evaluate_iterator_call(
                    &method_name,
                    &receiver_value,
                    block_node,
                    sym_proc.as_deref(),
                    source,
                    bindings,
                );
            }
            return Err(EvalError::InsufficientBindings(format!(
                "cannot run a block for '{method_name}'"
            )));
        }

        // Operator methods called with a dot go through the operator tables.
        if args.len() == 1 {
            if let Some(op) = self.binary_op_functions.get(&method_name) {
                return op(receiver_value, args.into_iter().next().unwrap_or(Value::Nil));
            }
        }
        if args.is_empty() {
            if let Some(op) = self.unary_op_functions.get(&method_name) {
                return op(receiver_value);
            }
        }

        match self.method_functions.get(&method_name) {
            None => Err(EvalError::unknown_method(receiver_value.type_name(), &method_name)),
            Some(entry) => {
                if args.len() < entry.min_args {
                    if args.is_empty() {
                        return Err(EvalError::bare_reference(&method_name, entry.min_args));
                    }
                    return Err(wrong_arity(&method_name, args.len(), entry.min_args));
                }
                if entry.max_args != usize::MAX && args.len() > entry.max_args {
                    return Err(wrong_arity(&method_name, args.len(), entry.max_args));
                }
                (entry.func)(&receiver_value, &args)
            }
        }
    }

    /// Evaluate an argument list, flattening splats and folding keyword
    /// pairs into a trailing hash. A `&:sym` block argument comes back
    /// separately since it turns the call into an iteration.
    fn evaluate_arguments(
        &self,
        arguments: Option<Node>,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<(Vec<Value>, Option<String>), EvalError> {
        let mut args = vec![];
        let mut keyword_pairs = vec![];
        let mut sym_proc = None;
        let Some(list) = arguments else {
            return Ok((args, sym_proc));
        };
        let mut cursor = list.walk();
        for child in list.named_children(&mut cursor) {
            match child.kind() {
                "splat_argument" => {
                    let inner = child
                        .named_child(0)
                        .ok_or_else(|| EvalError::raised("* without a value"))?;
                    match self.evaluate(inner, source, bindings)? {
                        Value::Array { elements } => args.extend(elements),
                        other => args.push(other),
                    }
                }
                "hash_splat_argument" => {
                    let inner = child
                        .named_child(0)
                        .ok_or_else(|| EvalError::raised("** without a value"))?;
                    match self.evaluate(inner, source, bindings)? {
                        Value::Hash { pairs } => keyword_pairs.extend(pairs),
                        other => {
                            return Err(EvalError::raised(format!(
                                "no implicit conversion of {} into Hash",
                                other.type_name()
                            )))
                        }
                    }
                }
                "pair" => keyword_pairs.push(self.evaluate_pair(child, source, bindings)?),
                "block_argument" => match child.named_child(0) {
                    Some(inner) if inner.kind() == "simple_symbol" => {
                        sym_proc = Some(node_text(&inner, source).trim_start_matches(':').to_string());
                    }
                    _ => {
                        return Err(EvalError::InsufficientBindings(
                            "cannot call a passed block".to_string(),
                        ))
                    }
                },
                "comment" => {}
                _ => args.push(self.evaluate(child, source, bindings)?),
            }
        }
        if !keyword_pairs.is_empty() {
            args.push(Value::hash(keyword_pairs));
        }
        Ok((args, sym_proc))
    }

    fn evaluate_iterator_call(
        &self,
        method_name: &str,
        receiver_value: &Value,
        block_node: Option<Node>,
        sym_proc: Option<&str>,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<Value, EvalError> {
        let elements = enumerable_elements(receiver_value)?.ok_or_else(|| {
            EvalError::raised(format!(
                "undefined method '{method_name}' for an instance of {}",
                receiver_value.type_name()
            ))
        })?;

        let mut results = vec![];
        for element in &elements {
            results.push(self.call_block(element, block_node, sym_proc, source, bindings)?);
        }

        let truthy = |v: &Value| v.is_truthy();
        match method_name {
            "map" | "collect" => Ok(Value::array(results)),
            "select" | "filter" => Ok(Value::array(
                elements
                    .iter()
                    .zip(&results)
                    .filter(|(_, r)| truthy(r))
                    .map(|(e, _)| e.clone())
                    .collect(),
            )),
            "reject" => Ok(Value::array(
                elements
                    .iter()
                    .zip(&results)
                    .filter(|(_, r)| !truthy(r))
                    .map(|(e, _)| e.clone())
                    .collect(),
            )),
            "find" | "detect" => Ok(elements
                .iter()
                .zip(&results)
                .find(|(_, r)| truthy(r))
                .map(|(e, _)| e.clone())
                .unwrap_or(Value::Nil)),
            "any?" => Ok(Value::bool(results.iter().any(truthy))),
            "all?" => Ok(Value::bool(results.iter().all(truthy))),
            "none?" => Ok(Value::bool(!results.iter().any(truthy))),
            "count" => Ok(Value::int(results.iter().filter(|r| truthy(r)).count() as i64)),
            "sum" => {
                let mut total = Value::int(0);
                for result in results {
                    total = operator_plus(total, result)?;
                }
                Ok(total)
            }
            "each" => Ok(receiver_value.clone()),
            _ => Err(EvalError::InsufficientBindings(format!(
                "cannot run a block for '{method_name}'"
            ))),
        }
    }

    /// Run one block invocation for `element`, shadowing the block's
    /// parameter names in the scratch layer and restoring them afterwards.
    fn call_block(
        &self,
        element: &Value,
        block_node: Option<Node>,
        sym_proc: Option<&str>,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<Value, EvalError> {
        if let Some(sym) = sym_proc {
            return match self.method_functions.get(sym) {
                None => Err(EvalError::unknown_method(element.type_name(), sym)),
                Some(entry) if entry.min_args > 0 => Err(EvalError::bare_reference(sym, entry.min_args)),
                Some(entry) => (entry.func)(element, &[]),
            };
        }
        let Some(block) = block_node else {
            return Err(EvalError::InsufficientBindings("block body not found".to_string()));
        };

        let mut names = vec![];
        if let Some(parameters) = block.child_by_field_name("parameters") {
            collect_parameter_names(parameters, source, &mut names);
        }
        let bound = bind_block_args(&names, std::slice::from_ref(element));

        let mut saved = vec![];
        for name in &names {
            let value = bound
                .iter()
                .find(|(bound_name, _)| bound_name == name)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Nil);
            saved.push((name.clone(), bindings.replace_local(name, Some(value))));
        }

        let statements = block_body_statements(block);
        let result = self.evaluate_body(&statements, source, bindings);

        for (name, previous) in saved.into_iter().rev() {
            bindings.replace_local(&name, previous);
        }
        result
    }

    fn evaluate_element_reference(
        &self,
        node: Node,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<Value, EvalError> {
        let object_node = self.field(node, "object")?;
        let object = self.evaluate(object_node, source, bindings)?;

        let mut subscripts = vec![];
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.id() == object_node.id() || child.kind() == "comment" {
                continue;
            }
            subscripts.push(self.evaluate(child, source, bindings)?);
        }

        match &object {
            Value::Array { elements } => index_array(elements, &subscripts),
            Value::Hash { pairs } => {
                let key = subscripts
                    .first()
                    .ok_or_else(|| EvalError::raised("wrong number of arguments calling '[]' (given 0, expected 1)"))?;
                Ok(pairs
                    .iter()
                    .find(|(k, _)| k.ruby_eq(key))
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Nil))
            }
            Value::Str { text } => index_string(text, &subscripts),
            other => Err(EvalError::raised(format!(
                "undefined method '[]' for an instance of {}",
                other.type_name()
            ))),
        }
    }
}

fn wrong_arity(name: &str, given: usize, expected: usize) -> EvalError {
    EvalError::raised(format!(
        "wrong number of arguments calling '{name}' (given {given}, expected {expected})"
    ))
}

fn variable_kind_label(kind: &str) -> &'static str {
    match kind {
        "instance_variable" => "instance variable",
        "class_variable" => "class variable",
        _ => "global variable",
    }
}

/// The elements an iterator method walks: arrays as-is, hashes as key/value
/// pairs, integer ranges expanded. `None` marks a non-enumerable receiver.
fn enumerable_elements(value: &Value) -> Result<Option<Vec<Value>>, EvalError> {
    match value {
        Value::Array { elements } => Ok(Some(elements.clone())),
        Value::Hash { pairs } => Ok(Some(
            pairs
                .iter()
                .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        Value::Range { from, to, exclusive } => expand_range(from, to, *exclusive).map(Some),
        _ => Ok(None),
    }
}

fn resolve_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { i + len } else { i };
    if idx >= 0 && idx < len {
        Some(idx as usize)
    } else {
        None
    }
}

/// Start/length slicing bounds for `a[i, n]` and `a[i..j]`, shared by
/// arrays and strings. `None` means the subscript falls outside the value.
fn slice_bounds(start: i64, length: i64, len: usize) -> Option<(usize, usize)> {
    let len_i = len as i64;
    let start = if start < 0 { start + len_i } else { start };
    if start < 0 || start > len_i || length < 0 {
        return None;
    }
    let end = (start + length).min(len_i);
    Some((start as usize, end as usize))
}

fn range_slice_bounds(from: &Value, to: &Value, exclusive: bool, len: usize) -> Result<Option<(usize, usize)>, EvalError> {
    let len_i = len as i64;
    let start = match from {
        Value::Nil => 0,
        Value::Int { i } => *i,
        other => return Err(EvalError::raised(format!("no implicit conversion of {} into Integer", other.type_name()))),
    };
    let mut end = match to {
        Value::Nil => len_i,
        Value::Int { i } => {
            let resolved = if *i < 0 { *i + len_i } else { *i };
            if exclusive {
                resolved
            } else {
                resolved + 1
            }
        }
        other => return Err(EvalError::raised(format!("no implicit conversion of {} into Integer", other.type_name()))),
    };
    let start = if start < 0 { start + len_i } else { start };
    if start < 0 || start > len_i {
        return Ok(None);
    }
    end = end.clamp(start, len_i);
    Ok(Some((start as usize, end as usize)))
}

fn index_array(elements: &[Value], subscripts: &[Value]) -> Result<Value, EvalError> {
    match subscripts {
        [Value::Int { i }] => Ok(resolve_index(*i, elements.len())
            .map(|idx| elements[idx].clone())
            .unwrap_or(Value::Nil)),
        [Value::Int { i }, Value::Int { i: n }] => Ok(slice_bounds(*i, *n, elements.len())
            .map(|(start, end)| Value::array(elements[start..end].to_vec()))
            .unwrap_or(Value::Nil)),
        [Value::Range { from, to, exclusive }] => {
            Ok(range_slice_bounds(from, to, *exclusive, elements.len())?
                .map(|(start, end)| Value::array(elements[start..end].to_vec()))
                .unwrap_or(Value::Nil))
        }
        [other] => Err(EvalError::raised(format!(
            "no implicit conversion of {} into Integer",
            other.type_name()
        ))),
        _ => Err(EvalError::raised("wrong number of arguments calling '[]'")),
    }
}

fn index_string(text: &str, subscripts: &[Value]) -> Result<Value, EvalError> {
    let chars: Vec<char> = text.chars().collect();
    match subscripts {
        [Value::Int { i }] => Ok(resolve_index(*i, chars.len())
            .map(|idx| Value::str(chars[idx].to_string()))
            .unwrap_or(Value::Nil)),
        [Value::Int { i }, Value::Int { i: n }] => Ok(slice_bounds(*i, *n, chars.len())
            .map(|(start, end)| Value::str(chars[start..end].iter().collect::<String>()))
            .unwrap_or(Value::Nil)),
        [Value::Range { from, to, exclusive }] => Ok(range_slice_bounds(from, to, *exclusive, chars.len())?
            .map(|(start, end)| Value::str(chars[start..end].iter().collect::<String>()))
            .unwrap_or(Value::Nil)),
        [Value::Str { text: sub }] => Ok(if text.contains(sub.as_str()) {
            Value::str(sub.clone())
        } else {
            Value::Nil
        }),
        [Value::Regexp { source }] => {
            let re = compile_regex(source)?;
            Ok(re
                .find(text)
                .map(|m| Value::str(m.as_str().to_string()))
                .unwrap_or(Value::Nil))
        }
        [other] => Err(EvalError::raised(format!(
            "no implicit conversion of {} into Integer",
            other.type_name()
        ))),
        _ => Err(EvalError::raised("wrong number of arguments calling '[]'")),
    }
}

fn parse_integer(text: &str) -> Result<Value, EvalError> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let (digits, radix) = if let Some(rest) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        (rest, 2)
    } else if let Some(rest) = cleaned.strip_prefix("0o").or_else(|| cleaned.strip_prefix("0O")) {
        (rest, 8)
    } else if cleaned.len() > 1 && cleaned.starts_with('0') && cleaned.chars().all(|c| c.is_ascii_digit()) {
        (&cleaned[1..], 8)
    } else {
        (cleaned.as_str(), 10)
    };
    i64::from_str_radix(digits, radix)
        .map(Value::int)
        .map_err(|_| EvalError::raised("integer literal out of range"))
}

fn parse_float(text: &str) -> Result<Value, EvalError> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    cleaned
        .parse::<f64>()
        .map(Value::float)
        .map_err(|_| EvalError::raised("malformed float literal"))
}

fn character_text(raw: &str) -> String {
    let inner = raw.strip_prefix('?').unwrap_or(raw);
    if inner.starts_with('\\') {
        unescape_sequence(inner)
    } else {
        inner.to_string()
    }
}

/// Decode one `\x`-style escape as the double-quoted string rules read it.
fn unescape_sequence(raw: &str) -> String {
    let mut chars = raw.chars();
    if chars.next() != Some('\\') {
        return raw.to_string();
    }
    let Some(marker) = chars.next() else {
        return String::new();
    };
    match marker {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        's' => " ".to_string(),
        '0' => "\0".to_string(),
        'a' => "\u{7}".to_string(),
        'b' => "\u{8}".to_string(),
        'e' => "\u{1b}".to_string(),
        'f' => "\u{c}".to_string(),
        'v' => "\u{b}".to_string(),
        'u' => {
            let rest: String = chars.collect();
            let hex = rest.trim_start_matches('{').trim_end_matches('}');
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default()
        }
        'x' => {
            let hex: String = chars.collect();
            u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default()
        }
        other => other.to_string(),
    }
}

fn collect_begin_parts<'t>(
    node: Node<'t>,
    statements: &mut Vec<Node<'t>>,
    rescues: &mut Vec<Node<'t>>,
    else_clause: &mut Option<Node<'t>>,
    ensure_clause: &mut Option<Node<'t>>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "body_statement" => collect_begin_parts(child, statements, rescues, else_clause, ensure_clause),
            "rescue" => rescues.push(child),
            "else" => *else_clause = Some(child),
            "ensure" => *ensure_clause = Some(child),
            "comment" => {}
            _ => statements.push(child),
        }
    }
}

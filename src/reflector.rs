use serde::Serialize;
use tree_sitter::Node;
use tree_sitter_traversal2::{traverse, Order};

use crate::error::ReflectError;
use crate::interpreter::{Bindings, Evaluator};
use crate::source_loader::{block_body_statements, node_text};
use crate::value::Value;

/// One reconstructed subexpression paired with the value it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capture {
    pub fragment: String,
    pub value: Value,
}

/// The walker's output: the canonical single-line reconstruction of the
/// asserted body and the ordered capture list.
#[derive(Debug)]
pub struct Reflection {
    pub text: String,
    pub captures: Vec<Capture>,
}

/// Walk the body statements in order, reconstructing canonical source text
/// and capturing fragment values. Each statement is evaluated after it is
/// walked so later fragments see the scratch locals earlier statements bound.
pub fn reflect_body(
    evaluator: &Evaluator,
    statements: &[Node],
    source: &str,
    bindings: &mut Bindings,
) -> Result<Reflection, ReflectError> {
    let mut reflector = Reflector {
        evaluator,
        buffer: String::new(),
        captures: vec![],
        in_string: false,
        shadowed: vec![],
    };
    let mut first = true;
    for statement in statements {
        if !first {
            reflector.push("; ");
        }
        reflector.reconstruct(*statement, source, bindings)?;
        first = false;
        // Advance the scratch state; a statement that cannot evaluate
        // leaves it unchanged.
        let _ = evaluator.evaluate(*statement, source, bindings);
    }
    Ok(Reflection {
        text: reflector.buffer,
        captures: reflector.captures,
    })
}

struct Reflector<'e> {
    evaluator: &'e Evaluator,
    buffer: String,
    captures: Vec<Capture>,
    in_string: bool,
    /// Parameter names of the blocks the walk is currently inside. A
    /// fragment that cannot resolve one of these has no single value here.
    shadowed: Vec<String>,
}

impl<'e> Reflector<'e> {
    fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn reconstruct(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        let mark = self.buffer.len();
        self.emit(node, source, bindings)?;
        self.maybe_capture(node, mark, source, bindings);
        Ok(())
    }

    fn maybe_capture(&mut self, node: Node, mark: usize, source: &str, bindings: &mut Bindings) {
        if !is_capturable(node, source) {
            return;
        }
        let fragment = self.buffer[mark..].to_string();
        if fragment.is_empty() {
            return;
        }
        match self.evaluator.evaluate(node, source, bindings) {
            Ok(value) => {
                if literal_self_match(&fragment, &value) {
                    return;
                }
                self.captures.push(Capture { fragment, value });
            }
            Err(e) if e.is_silent() => {}
            Err(crate::error::EvalError::MissingBinding(_)) if self.references_shadowed(node, source) => {}
            Err(e) => self.captures.push(Capture {
                fragment,
                value: Value::error(e.message()),
            }),
        }
    }

    fn references_shadowed(&self, node: Node, source: &str) -> bool {
        if self.shadowed.is_empty() {
            return false;
        }
        traverse(node.walk(), Order::Pre)
            .any(|n| n.kind() == "identifier" && self.shadowed.iter().any(|s| s == node_text(&n, source)))
    }

    fn emit(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        match node.kind() {
            "nil" | "true" | "false" | "integer" | "float" | "identifier" | "constant" | "self" | "super"
            | "instance_variable" | "class_variable" | "global_variable" | "simple_symbol"
            | "delimited_symbol" | "hash_key_symbol" | "character" | "operator" | "alias" | "undef" => {
                self.push(node_text(&node, source));
                Ok(())
            }
            "scope_resolution" => {
                self.push(node_text(&node, source));
                Ok(())
            }

            "string" => self.emit_string(node, source, bindings),
            "chained_string" => {
                let mut cursor = node.walk();
                let parts: Vec<Node> = node.named_children(&mut cursor).collect();
                self.emit_list(&parts, " ", source, bindings)
            }
            "regex" => {
                self.push("/");
                self.emit_literal_parts(node, source, bindings, false)?;
                self.push("/");
                Ok(())
            }
            "string_array" | "symbol_array" => {
                let symbols = node.kind() == "symbol_array";
                self.push("[");
                let mut cursor = node.walk();
                let mut first = true;
                for word in node.named_children(&mut cursor) {
                    if !first {
                        self.push(", ");
                    }
                    if symbols {
                        self.push(":");
                        self.push(node_text(&word, source));
                    } else {
                        self.push("\"");
                        self.push(node_text(&word, source));
                        self.push("\"");
                    }
                    first = false;
                }
                self.push("]");
                Ok(())
            }
            "interpolation" => {
                let was = self.in_string;
                self.in_string = false;
                self.push("#{");
                self.emit_children_statements(node, source, bindings)?;
                self.push("}");
                self.in_string = was;
                Ok(())
            }

            "array" => {
                self.push("[");
                self.emit_named_children(node, ", ", source, bindings)?;
                self.push("]");
                Ok(())
            }
            "hash" => {
                self.push("{");
                self.emit_named_children(node, ", ", source, bindings)?;
                self.push("}");
                Ok(())
            }
            "pair" => self.emit_pair(node, source, bindings),
            "splat_argument" | "rest_assignment" => {
                self.push("*");
                if let Some(inner) = node.named_child(0) {
                    self.reconstruct(inner, source, bindings)?;
                }
                Ok(())
            }
            "hash_splat_argument" => {
                self.push("**");
                if let Some(inner) = node.named_child(0) {
                    self.reconstruct(inner, source, bindings)?;
                }
                Ok(())
            }
            "block_argument" => {
                self.push("&");
                if let Some(inner) = node.named_child(0) {
                    self.reconstruct(inner, source, bindings)?;
                }
                Ok(())
            }

            "binary" => {
                self.reconstruct(self.field(node, "left")?, source, bindings)?;
                self.push(" ");
                self.push(node_text(&self.field(node, "operator")?, source));
                self.push(" ");
                self.reconstruct(self.field(node, "right")?, source, bindings)
            }
            "unary" => self.emit_unary(node, source, bindings),
            "range" => {
                if let Some(begin) = node.child_by_field_name("begin") {
                    self.reconstruct(begin, source, bindings)?;
                }
                self.push(node_text(&self.field(node, "operator")?, source));
                if let Some(end) = node.child_by_field_name("end") {
                    self.reconstruct(end, source, bindings)?;
                }
                Ok(())
            }
            "conditional" => {
                self.reconstruct(self.field(node, "condition")?, source, bindings)?;
                self.push(" ? ");
                self.reconstruct(self.field(node, "consequence")?, source, bindings)?;
                self.push(" : ");
                self.reconstruct(self.field(node, "alternative")?, source, bindings)
            }

            "call" => self.emit_call(node, source, bindings),
            "element_reference" => {
                let object = self.field(node, "object")?;
                self.reconstruct(object, source, bindings)?;
                self.push("[");
                let mut cursor = node.walk();
                let subscripts: Vec<Node> = node
                    .named_children(&mut cursor)
                    .filter(|c| c.id() != object.id())
                    .collect();
                self.emit_list(&subscripts, ", ", source, bindings)?;
                self.push("]");
                Ok(())
            }

            "assignment" => {
                self.reconstruct(self.field(node, "left")?, source, bindings)?;
                self.push(" = ");
                self.reconstruct(self.field(node, "right")?, source, bindings)
            }
            "operator_assignment" => {
                self.reconstruct(self.field(node, "left")?, source, bindings)?;
                self.push(" ");
                self.push(node_text(&self.field(node, "operator")?, source));
                self.push(" ");
                self.reconstruct(self.field(node, "right")?, source, bindings)
            }
            "left_assignment_list" | "destructured_left_assignment" => {
                self.emit_named_children(node, ", ", source, bindings)
            }

            "if" => {
                self.emit_if_chain(node, "if", source, bindings)?;
                self.push(" end");
                Ok(())
            }
            "unless" => {
                self.emit_if_chain(node, "unless", source, bindings)?;
                self.push(" end");
                Ok(())
            }
            "elsif" => self.emit_if_chain(node, "elsif", source, bindings),
            "then" | "else" | "do" | "block_body" | "body_statement" => {
                self.emit_children_statements(node, source, bindings)
            }
            "if_modifier" | "unless_modifier" | "while_modifier" | "until_modifier" => {
                self.reconstruct(self.field(node, "body")?, source, bindings)?;
                self.push(match node.kind() {
                    "if_modifier" => " if ",
                    "unless_modifier" => " unless ",
                    "while_modifier" => " while ",
                    _ => " until ",
                });
                self.reconstruct(self.field(node, "condition")?, source, bindings)
            }
            "while" | "until" => {
                self.push(if node.kind() == "while" { "while " } else { "until " });
                self.reconstruct(self.field(node, "condition")?, source, bindings)?;
                self.push(" do ");
                self.reconstruct(self.field(node, "body")?, source, bindings)?;
                self.push(" end");
                Ok(())
            }
            "for" => {
                self.push("for ");
                self.reconstruct(self.field(node, "pattern")?, source, bindings)?;
                self.push(" in ");
                let value = self.field(node, "value")?;
                if let Some(iterable) = value.named_child(0) {
                    self.reconstruct(iterable, source, bindings)?;
                }
                self.push(" do ");
                self.reconstruct(self.field(node, "body")?, source, bindings)?;
                self.push(" end");
                Ok(())
            }
            "case" => self.emit_case(node, source, bindings),
            "begin" => self.emit_begin(node, source, bindings),
            "rescue_modifier" => {
                self.reconstruct(self.field(node, "body")?, source, bindings)?;
                self.push(" rescue ");
                self.reconstruct(self.field(node, "handler")?, source, bindings)
            }

            "method" | "singleton_method" => self.emit_method(node, source, bindings),
            "class" | "module" => self.emit_class(node, source, bindings),
            "singleton_class" => {
                self.push("class << ");
                self.reconstruct(self.field(node, "value")?, source, bindings)?;
                self.push(" ");
                self.emit_body_statements(node, source, bindings)?;
                self.push(" end");
                Ok(())
            }
            "lambda" => {
                self.push("->");
                if let Some(parameters) = node.child_by_field_name("parameters") {
                    self.push("(");
                    self.emit_parameters(parameters, source)?;
                    self.push(")");
                }
                let body = self.field(node, "body")?;
                self.emit_block(body, source, bindings)
            }

            "yield" => {
                self.push("yield");
                if let Some(arguments) = node.named_child(0) {
                    self.push("(");
                    self.emit_named_children(arguments, ", ", source, bindings)?;
                    self.push(")");
                }
                Ok(())
            }
            "return" | "break" | "next" => {
                self.push(node.kind());
                if let Some(arguments) = node.named_child(0) {
                    self.push(" ");
                    self.emit_named_children(arguments, ", ", source, bindings)?;
                }
                Ok(())
            }
            "redo" | "retry" => {
                self.push(node.kind());
                Ok(())
            }

            "parenthesized_statements" => {
                self.push("(");
                self.emit_children_statements(node, source, bindings)?;
                self.push(")");
                Ok(())
            }
            "comment" | "empty_statement" => Ok(()),

            kind => Err(ReflectError::UnsupportedConstruct {
                kind: kind.to_string(),
                row: node.start_position().row,
                column: node.start_position().column,
            }),
        }
    }

    fn field<'t>(&self, node: Node<'t>, name: &str) -> Result<Node<'t>, ReflectError> {
        node.child_by_field_name(name).ok_or_else(|| ReflectError::UnsupportedConstruct {
            kind: format!("{} without {name}", node.kind()),
            row: node.start_position().row,
            column: node.start_position().column,
        })
    }

    fn emit_list(
        &mut self,
        items: &[Node],
        separator: &str,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<(), ReflectError> {
        let mut first = true;
        for item in items {
            if item.kind() == "comment" || item.kind() == "empty_statement" {
                continue;
            }
            if !first {
                self.push(separator);
            }
            self.reconstruct(*item, source, bindings)?;
            first = false;
        }
        Ok(())
    }

    fn emit_named_children(
        &mut self,
        node: Node,
        separator: &str,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<(), ReflectError> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        self.emit_list(&children, separator, source, bindings)
    }

    fn emit_children_statements(
        &mut self,
        node: Node,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<(), ReflectError> {
        self.emit_named_children(node, "; ", source, bindings)
    }

    /// String literals normalize to double-quoted form regardless of the
    /// source spelling; interior double quotes are escaped on emission.
    fn emit_string(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        let single_quoted = !node_text(&node, source).starts_with('"');
        let was = self.in_string;
        self.in_string = true;
        self.push("\"");
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "string_content" => {
                    let text = node_text(&child, source);
                    if text.contains('"') {
                        let escaped = text.replace('"', "\\\"");
                        self.push(&escaped);
                    } else {
                        self.push(text);
                    }
                }
                "escape_sequence" => {
                    let raw = node_text(&child, source);
                    if single_quoted && raw == "\\'" {
                        self.push("'");
                    } else {
                        self.push(raw);
                    }
                }
                "interpolation" => self.reconstruct(child, source, bindings)?,
                _ => self.push(node_text(&child, source)),
            }
        }
        self.push("\"");
        self.in_string = was;
        Ok(())
    }

    fn emit_literal_parts(
        &mut self,
        node: Node,
        source: &str,
        bindings: &mut Bindings,
        escape_quotes: bool,
    ) -> Result<(), ReflectError> {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "interpolation" => self.reconstruct(child, source, bindings)?,
                _ => {
                    let text = node_text(&child, source);
                    if escape_quotes && text.contains('"') {
                        let escaped = text.replace('"', "\\\"");
                        self.push(&escaped);
                    } else {
                        self.push(text);
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_pair(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        let key = self.field(node, "key")?;
        if key.kind() == "hash_key_symbol" {
            self.push(node_text(&key, source));
            self.push(":");
        } else {
            self.reconstruct(key, source, bindings)?;
            self.push(" =>");
        }
        if let Some(value) = node.child_by_field_name("value") {
            self.push(" ");
            self.reconstruct(value, source, bindings)?;
        }
        Ok(())
    }

    fn emit_unary(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        let operator = node_text(&self.field(node, "operator")?, source);
        let operand = self.field(node, "operand")?;
        match operator {
            "defined?" => {
                self.push("defined?(");
                self.reconstruct(operand, source, bindings)?;
                self.push(")");
            }
            "not" => {
                self.push("not ");
                self.reconstruct(operand, source, bindings)?;
            }
            _ => {
                self.push(operator);
                self.reconstruct(operand, source, bindings)?;
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        if let Some(receiver) = node.child_by_field_name("receiver") {
            self.reconstruct(receiver, source, bindings)?;
            let operator = node
                .child_by_field_name("operator")
                .map(|op| node_text(&op, source))
                .unwrap_or(".");
            self.push(operator);
        }
        self.push(node_text(&self.field(node, "method")?, source));
        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.named_child_count() > 0 {
                self.push("(");
                self.emit_named_children(arguments, ", ", source, bindings)?;
                self.push(")");
            }
        }
        if let Some(block) = node.child_by_field_name("block") {
            self.emit_block(block, source, bindings)?;
        }
        Ok(())
    }

    /// Brace and do blocks both reconstruct to the brace spelling. The
    /// block's parameter names shadow outer bindings for capture purposes
    /// while the walk is inside it.
    fn emit_block(&mut self, block: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        self.push(" { ");
        let mut names = vec![];
        if let Some(parameters) = block.child_by_field_name("parameters") {
            self.push("|");
            self.emit_parameters(parameters, source)?;
            self.push("| ");
            crate::source_loader::collect_parameter_names(parameters, source, &mut names);
        }
        let shadow_mark = self.shadowed.len();
        self.shadowed.extend(names);
        let statements = block_body_statements(block);
        let result = self.emit_list(&statements, "; ", source, bindings);
        self.shadowed.truncate(shadow_mark);
        result?;
        self.push(" }");
        Ok(())
    }

    fn emit_parameters(&mut self, parameters: Node, source: &str) -> Result<(), ReflectError> {
        let mut cursor = parameters.walk();
        let mut first = true;
        for parameter in parameters.named_children(&mut cursor) {
            if parameter.kind() == "comment" {
                continue;
            }
            if !first {
                self.push(", ");
            }
            self.push(node_text(&parameter, source));
            first = false;
        }
        Ok(())
    }

    fn emit_if_chain(
        &mut self,
        node: Node,
        keyword: &str,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<(), ReflectError> {
        self.push(keyword);
        self.push(" ");
        self.reconstruct(self.field(node, "condition")?, source, bindings)?;
        self.push(" then ");
        if let Some(consequence) = node.child_by_field_name("consequence") {
            self.reconstruct(consequence, source, bindings)?;
        }
        if let Some(alternative) = node.child_by_field_name("alternative") {
            if alternative.kind() == "elsif" {
                self.push(" ");
                self.emit_if_chain(alternative, "elsif", source, bindings)?;
            } else {
                self.push(" else ");
                self.reconstruct(alternative, source, bindings)?;
            }
        }
        Ok(())
    }

    fn emit_case(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        self.push("case");
        if let Some(value) = node.child_by_field_name("value") {
            self.push(" ");
            self.reconstruct(value, source, bindings)?;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "when" => {
                    self.push(" when ");
                    let mut when_cursor = child.walk();
                    let patterns: Vec<Node> = child
                        .named_children(&mut when_cursor)
                        .filter(|c| !matches!(c.kind(), "then" | "comment"))
                        .collect();
                    self.emit_list(&patterns, ", ", source, bindings)?;
                    if let Some(body) = child.child_by_field_name("body") {
                        self.push(" then ");
                        self.reconstruct(body, source, bindings)?;
                    }
                }
                "else" => {
                    self.push(" else ");
                    self.reconstruct(child, source, bindings)?;
                }
                _ => {}
            }
        }
        self.push(" end");
        Ok(())
    }

    fn emit_begin(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        self.push("begin ");
        self.emit_begin_parts(node, source, bindings)?;
        self.push(" end");
        Ok(())
    }

    fn emit_begin_parts(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        let mut cursor = node.walk();
        let mut first_statement = true;
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "body_statement" => self.emit_begin_parts(child, source, bindings)?,
                "rescue" => {
                    self.push(" rescue");
                    if let Some(exceptions) = child.child_by_field_name("exceptions") {
                        self.push(" ");
                        self.emit_named_children(exceptions, ", ", source, bindings)?;
                    }
                    if let Some(variable) = child.child_by_field_name("variable") {
                        self.push(" => ");
                        if let Some(lhs) = variable.named_child(0) {
                            self.push(node_text(&lhs, source));
                        }
                    }
                    if let Some(body) = child.child_by_field_name("body") {
                        self.push("; ");
                        self.reconstruct(body, source, bindings)?;
                    }
                }
                "else" => {
                    self.push(" else ");
                    self.reconstruct(child, source, bindings)?;
                }
                "ensure" => {
                    self.push(" ensure ");
                    self.emit_children_statements(child, source, bindings)?;
                }
                "comment" => {}
                _ => {
                    if !first_statement {
                        self.push("; ");
                    }
                    self.reconstruct(child, source, bindings)?;
                    first_statement = false;
                }
            }
        }
        Ok(())
    }

    fn emit_method(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        self.push("def ");
        if let Some(object) = node.child_by_field_name("object") {
            self.push(node_text(&object, source));
            self.push(".");
        }
        self.push(node_text(&self.field(node, "name")?, source));
        if let Some(parameters) = node.child_by_field_name("parameters") {
            if parameters.named_child_count() > 0 {
                self.push("(");
                self.emit_parameters(parameters, source)?;
                self.push(")");
            }
        }
        // Endless definitions carry the expression in a body field; the
        // block form has a body_statement child.
        if let Some(body) = node.child_by_field_name("body") {
            self.push(" = ");
            self.reconstruct(body, source, bindings)?;
            return Ok(());
        }
        self.push(" ");
        self.emit_body_statements(node, source, bindings)?;
        self.push(" end");
        Ok(())
    }

    fn emit_class(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        self.push(if node.kind() == "class" { "class " } else { "module " });
        self.push(node_text(&self.field(node, "name")?, source));
        if let Some(superclass) = node.child_by_field_name("superclass") {
            self.push(" < ");
            if let Some(parent) = superclass.named_child(0) {
                self.reconstruct(parent, source, bindings)?;
            }
        }
        self.push(" ");
        self.emit_body_statements(node, source, bindings)?;
        self.push(" end");
        Ok(())
    }

    fn emit_body_statements(&mut self, node: Node, source: &str, bindings: &mut Bindings) -> Result<(), ReflectError> {
        let mut cursor = node.walk();
        let mut statements = vec![];
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "body_statement" => {
                    let mut inner = child.walk();
                    for statement in child.named_children(&mut inner) {
                        statements.push(statement);
                    }
                }
                "constant" | "superclass" | "comment" => {}
                _ => {
                    if node.child_by_field_name("name").map(|n| n.id()) != Some(child.id())
                        && node.child_by_field_name("value").map(|n| n.id()) != Some(child.id())
                        && node.child_by_field_name("parameters").map(|n| n.id()) != Some(child.id())
                        && node.child_by_field_name("object").map(|n| n.id()) != Some(child.id())
                    {
                        statements.push(child);
                    }
                }
            }
        }
        self.emit_list(&statements, "; ", source, bindings)
    }
}

fn is_capturable(node: Node, source: &str) -> bool {
    match node.kind() {
        "binary" | "unary" | "call" | "element_reference" => true,
        "constant" | "scope_resolution" | "instance_variable" | "class_variable" | "global_variable" => true,
        "identifier" => identifier_in_expression_position(node),
        "string" | "regex" => has_interpolation(node),
        _ => {
            let _ = source;
            false
        }
    }
}

fn has_interpolation(node: Node) -> bool {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .any(|c| c.kind() == "interpolation");
    found
}

/// An identifier is an expression unless it names something: a called
/// method, an assignment or iteration target, a parameter, a definition.
fn identifier_in_expression_position(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    let field = field_name_in_parent(node);
    match parent.kind() {
        "call" => field != Some("method"),
        "method" | "singleton_method" | "class" | "module" => field != Some("name"),
        "assignment" | "operator_assignment" => field != Some("left"),
        "for" => field != Some("pattern"),
        "left_assignment_list" | "rest_assignment" | "destructured_left_assignment" | "exception_variable"
        | "block_parameters" | "method_parameters" | "lambda_parameters" | "destructured_parameter"
        | "splat_parameter" | "optional_parameter" | "keyword_parameter" | "block_parameter" => false,
        _ => true,
    }
}

fn field_name_in_parent(node: Node) -> Option<&'static str> {
    let parent = node.parent()?;
    let mut cursor = parent.walk();
    if !cursor.goto_first_child() {
        return None;
    }
    loop {
        if cursor.node().id() == node.id() {
            return cursor.field_name();
        }
        if !cursor.goto_next_sibling() {
            return None;
        }
    }
}

/// A quoted string or bare regex whose reconstruction spells exactly the
/// value it produced carries no information.
fn literal_self_match(fragment: &str, value: &Value) -> bool {
    matches!(value, Value::Str { .. } | Value::Regexp { .. }) && fragment == value.inspect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use crate::source_loader::parse_source;

    fn reflect(source: &str, scope: &Scope) -> Reflection {
        let tree = parse_source(source).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let statements: Vec<Node> = root.named_children(&mut cursor).collect();
        let evaluator = Evaluator::new();
        let mut bindings = Bindings::new(scope);
        reflect_body(&evaluator, &statements, source, &mut bindings).unwrap()
    }

    fn fragments(reflection: &Reflection) -> Vec<&str> {
        reflection.captures.iter().map(|c| c.fragment.as_str()).collect()
    }

    #[test]
    fn captures_inner_expressions_before_outer() {
        let reflection = reflect("1 + 1 == 3", &Scope::new());
        assert_eq!(reflection.text, "1 + 1 == 3");
        assert_eq!(fragments(&reflection), ["1 + 1", "1 + 1 == 3"]);
        assert_eq!(reflection.captures[0].value, Value::int(2));
        assert_eq!(reflection.captures[1].value, Value::bool(false));
    }

    #[test]
    fn literals_are_not_captured() {
        let reflection = reflect("2 < 3", &Scope::new());
        assert_eq!(fragments(&reflection), ["2 < 3"]);
    }

    #[test]
    fn identifiers_capture_their_binding() {
        let scope: Scope = [("z".to_string(), Value::str("xyz"))].into_iter().collect();
        let reflection = reflect("z =~ /ab/", &scope);
        assert_eq!(fragments(&reflection), ["z", "z =~ /ab/"]);
        assert_eq!(reflection.captures[0].value, Value::str("xyz"));
        assert_eq!(reflection.captures[1].value, Value::Nil);
    }

    #[test]
    fn method_names_are_not_captured() {
        let scope: Scope = [("items".to_string(), Value::array(vec![Value::int(1)]))]
            .into_iter()
            .collect();
        let reflection = reflect("items.size == 2", &scope);
        assert_eq!(fragments(&reflection), ["items", "items.size", "items.size == 2"]);
        assert_eq!(reflection.captures[1].value, Value::int(1));
    }

    #[test]
    fn interpolated_strings_capture_but_plain_do_not() {
        let scope: Scope = [("x".to_string(), Value::str("c"))].into_iter().collect();
        let reflection = reflect("\"b#{x}\" == \"bc\"", &scope);
        assert_eq!(fragments(&reflection), ["x", "\"b#{x}\"", "\"b#{x}\" == \"bc\""]);
        assert_eq!(reflection.captures[1].value, Value::str("bc"));
    }

    #[test]
    fn unresolved_names_surface_as_error_values() {
        let reflection = reflect("price * 2 == 4", &Scope::new());
        let price = &reflection.captures[0];
        assert_eq!(price.fragment, "price");
        assert!(matches!(price.value, Value::Error { .. }));
    }

    #[test]
    fn block_parameter_references_stay_silent() {
        let scope: Scope = [(
            "items".to_string(),
            Value::array(vec![Value::int(1), Value::int(2)]),
        )]
        .into_iter()
        .collect();
        let reflection = reflect("items.map { |n| n * 2 } == [2, 4]", &scope);
        assert_eq!(
            fragments(&reflection),
            ["items", "items.map { |n| n * 2 }", "items.map { |n| n * 2 } == [2, 4]"]
        );
        assert_eq!(
            reflection.captures[1].value,
            Value::array(vec![Value::int(2), Value::int(4)])
        );
        assert_eq!(reflection.captures[2].value, Value::bool(true));
    }

    #[test]
    fn statements_join_with_semicolons_and_share_scratch_state() {
        let reflection = reflect("a = 1\na + 1", &Scope::new());
        assert_eq!(reflection.text, "a = 1; a + 1");
        assert_eq!(fragments(&reflection), ["a", "a + 1"]);
        assert_eq!(reflection.captures[0].value, Value::int(1));
        assert_eq!(reflection.captures[1].value, Value::int(2));
    }

    #[test]
    fn single_quoted_strings_normalize_to_double() {
        let reflection = reflect("'a' + 'b' == \"ab\"", &Scope::new());
        assert_eq!(reflection.text, "\"a\" + \"b\" == \"ab\"");
    }

    #[test]
    fn self_matching_string_literals_are_suppressed() {
        assert!(literal_self_match("\"foo\"", &Value::str("foo")));
        assert!(!literal_self_match("\"foo\"", &Value::str("bar")));
        assert!(literal_self_match("/ab/", &Value::regexp("ab")));
        assert!(!literal_self_match("z", &Value::str("z")));
    }

    #[test]
    fn heredocs_are_rejected_loudly() {
        let source = "x = <<~TEXT\n  hi\nTEXT\nx == \"hi\"";
        let tree = parse_source(source).unwrap();
        let root = tree.root_node();
        let mut cursor = root.walk();
        let statements: Vec<Node> = root.named_children(&mut cursor).collect();
        let evaluator = Evaluator::new();
        let scope = Scope::new();
        let mut bindings = Bindings::new(&scope);
        let err = reflect_body(&evaluator, &statements, source, &mut bindings).unwrap_err();
        assert!(matches!(err, ReflectError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn ternaries_and_ranges_reconstruct_canonically() {
        let scope: Scope = [("n".to_string(), Value::int(5))].into_iter().collect();
        let reflection = reflect("(1..10).include?(n) ? n : 0", &scope);
        assert_eq!(reflection.text, "(1..10).include?(n) ? n : 0");
    }
}

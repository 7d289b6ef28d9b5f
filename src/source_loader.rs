use std::fs;
use std::path::PathBuf;

use log::{debug, warn};
use tree_sitter::{Node, Parser, Tree};
use tree_sitter_traversal2::{traverse, Order};

use crate::config::ReflectConfig;
use crate::error::ReflectError;

/// Where the failed assertion was called from, as reported by the caller's
/// stack inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub path: PathBuf,
    pub line: usize,
}

impl CallSite {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> CallSite {
        CallSite { path: path.into(), line }
    }
}

/// The minimal parseable window of source starting at the call line.
#[derive(Debug)]
pub struct LocatedSource {
    pub text: String,
    pub tree: Tree,
    pub window_lines: usize,
}

/// The assertion call found inside a located window: its block, the block's
/// body statements, and the parameter names the block arguments should bind.
pub struct AssertionSite<'t> {
    pub call: Node<'t>,
    pub block: Node<'t>,
    pub body: Vec<Node<'t>>,
    pub parameter_names: Vec<String>,
}

pub fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    &source[node.start_byte()..node.end_byte()]
}

pub fn parse_source(source: &str) -> Result<Tree, ReflectError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_ruby::LANGUAGE.into())?;
    parser
        .parse(source, None)
        .ok_or_else(|| ReflectError::Parser("parser produced no tree".to_string()))
}

/// A window is usable only when nothing in it parsed as an error and no
/// token had to be invented to finish the tree.
pub fn parses_cleanly(tree: &Tree) -> bool {
    let root = tree.root_node();
    if root.has_error() {
        return false;
    }
    traverse(root.walk(), Order::Pre).all(|node| !node.is_error() && !node.is_missing())
}

/// Grow a line window from the call line until it parses cleanly. Ruby's
/// continuation style guarantees an unfinished statement will not parse, so
/// the first clean window is the whole assertion.
pub fn locate(call: &CallSite, config: &ReflectConfig) -> Result<LocatedSource, ReflectError> {
    let raw = fs::read_to_string(&call.path)?;
    let lines: Vec<&str> = raw.lines().collect();
    if call.line == 0 || call.line > lines.len() {
        warn!("call line {} outside {} ({} lines)", call.line, call.path.display(), lines.len());
        return Err(ReflectError::MalformedSource {
            path: call.path.clone(),
            line: call.line,
            attempted: 0,
        });
    }

    let start = call.line - 1;
    let available = lines.len() - start;
    let cap = available.min(config.max_window_lines);
    for count in 1..=cap {
        let text = lines[start..start + count].join("\n");
        let tree = parse_source(&text)?;
        if parses_cleanly(&tree) {
            debug!("located {}:{} in a {count}-line window", call.path.display(), call.line);
            return Ok(LocatedSource {
                text,
                tree,
                window_lines: count,
            });
        }
    }

    warn!(
        "no parseable window at {}:{} after {cap} line(s)",
        call.path.display(),
        call.line
    );
    Err(ReflectError::MalformedSource {
        path: call.path.clone(),
        line: call.line,
        attempted: cap,
    })
}

/// Find the first `name { ... }` call in the window and pull apart its block.
pub fn find_assertion_block<'t>(
    located: &'t LocatedSource,
    source: &str,
    name: &str,
) -> Result<AssertionSite<'t>, ReflectError> {
    let root = located.tree.root_node();
    for node in traverse(root.walk(), Order::Pre) {
        if node.kind() != "call" {
            continue;
        }
        let Some(method) = node.child_by_field_name("method") else {
            continue;
        };
        if node_text(&method, source) != name {
            continue;
        }
        let Some(block) = node.child_by_field_name("block") else {
            continue;
        };
        return Ok(AssertionSite {
            call: node,
            block,
            body: block_body_statements(block),
            parameter_names: nearest_parameter_names(block, source),
        });
    }
    Err(ReflectError::BlockNotFound { name: name.to_string() })
}

/// The statements of a brace or do block, skipping the parameter list and
/// comments and flattening the body wrapper node.
pub(crate) fn block_body_statements(block: Node) -> Vec<Node> {
    let mut statements = vec![];
    let mut cursor = block.walk();
    for child in block.named_children(&mut cursor) {
        match child.kind() {
            "block_parameters" => {}
            "comment" => {}
            "block_body" | "body_statement" => {
                let mut inner = child.walk();
                for statement in child.named_children(&mut inner) {
                    if statement.kind() != "comment" {
                        statements.push(statement);
                    }
                }
            }
            _ => statements.push(child),
        }
    }
    statements
}

/// Names declared by the nearest parameterized block at or above the
/// assertion's own block. Only the nearest list is taken: the recorded block
/// arguments are the ones that enclosing call most recently supplied.
fn nearest_parameter_names(block: Node, source: &str) -> Vec<String> {
    let mut current = Some(block);
    while let Some(node) = current {
        if matches!(node.kind(), "block" | "do_block" | "lambda") {
            if let Some(parameters) = node.child_by_field_name("parameters") {
                let mut names = vec![];
                collect_parameter_names(parameters, source, &mut names);
                if !names.is_empty() {
                    return names;
                }
            }
        }
        current = node.parent();
    }
    vec![]
}

pub(crate) fn collect_parameter_names(node: Node, source: &str, out: &mut Vec<String>) {
    if node.kind() == "identifier" {
        out.push(node_text(&node, source).to_string());
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_parameter_names(child, source, out);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(name: &str, code: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, code).unwrap();
        path
    }

    #[test]
    fn locates_a_single_line_assertion() {
        let path = write_fixture(
            "loader_single_line.rb",
            "x = 1\nassert { x == 2 }\nputs x\n",
        );
        let located = locate(&CallSite::new(&path, 2), &ReflectConfig::default()).unwrap();
        assert_eq!(located.window_lines, 1);
        assert_eq!(located.text, "assert { x == 2 }");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn grows_the_window_until_the_block_closes() {
        let path = write_fixture(
            "loader_multi_line.rb",
            "assert do\n  x ==\n    2\nend\nputs 1\n",
        );
        let located = locate(&CallSite::new(&path, 1), &ReflectConfig::default()).unwrap();
        assert_eq!(located.window_lines, 4);
        assert!(located.text.ends_with("end"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reports_malformed_source_when_nothing_parses() {
        let path = write_fixture("loader_unclosed.rb", "assert {\n  x ==\n");
        let err = locate(&CallSite::new(&path, 1), &ReflectConfig::default()).unwrap_err();
        match err {
            ReflectError::MalformedSource { line, attempted, .. } => {
                assert_eq!(line, 1);
                assert_eq!(attempted, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn finds_the_assertion_block_and_enclosing_parameters() {
        let code = "items.each { |n| assert { n > 0 } }";
        let tree = parse_source(code).unwrap();
        let located = LocatedSource {
            text: code.to_string(),
            tree,
            window_lines: 1,
        };
        let site = find_assertion_block(&located, code, "assert").unwrap();
        assert_eq!(site.body.len(), 1);
        assert_eq!(node_text(&site.body[0], code), "n > 0");
        assert_eq!(site.parameter_names, ["n"]);
    }

    #[test]
    fn missing_block_is_an_error() {
        let code = "puts 1";
        let tree = parse_source(code).unwrap();
        let located = LocatedSource {
            text: code.to_string(),
            tree,
            window_lines: 1,
        };
        assert!(find_assertion_block(&located, code, "assert").is_err());
    }
}

#![allow(clippy::unwrap_used)]

use crate::error::EvalError;
use crate::scope::Scope;
use crate::source_loader::parse_source;
use crate::value::Value;

use super::{Bindings, Evaluator};

#[test]
fn integer_arithmetic() {
    assert_eq!(eval("1 + 2 * 3").unwrap(), Value::int(7));
    assert_eq!(eval("2 ** 10").unwrap(), Value::int(1024));
    assert_eq!(eval("7 / 2").unwrap(), Value::int(3));
    assert_eq!(eval("-7 / 2").unwrap(), Value::int(-4));
    assert_eq!(eval("7 % -2").unwrap(), Value::int(-1));
    assert_eq!(eval("0x10 + 0b101").unwrap(), Value::int(21));
    assert_eq!(eval("1_000_000 / 1000").unwrap(), Value::int(1000));
}

#[test]
fn float_arithmetic() {
    assert_eq!(eval("1.5 + 2.25").unwrap(), Value::float(3.75));
    assert_eq!(eval("3 / 2.0").unwrap(), Value::float(1.5));
    assert_eq!(eval("2.5.floor").unwrap(), Value::int(2));
}

#[test]
fn division_by_zero_raises() {
    let err = eval("1 / 0").unwrap_err();
    assert_eq!(err, EvalError::raised("divided by 0"));
    assert!(!err.is_silent());
}

#[test]
fn comparisons() {
    assert_eq!(eval("1 < 2").unwrap(), Value::bool(true));
    assert_eq!(eval("2 <=> 1").unwrap(), Value::int(1));
    assert_eq!(eval("\"a\" < \"b\"").unwrap(), Value::bool(true));
    assert_eq!(eval("1 == 1.0").unwrap(), Value::bool(true));
    assert_eq!(eval("\"a\" != \"b\"").unwrap(), Value::bool(true));
}

#[test]
fn incomparable_types_raise() {
    let err = eval("1 < \"a\"").unwrap_err();
    assert!(matches!(err, EvalError::Raised(_)));
}

#[test]
fn string_operators_and_interpolation() {
    assert_eq!(eval("\"ab\" + \"cd\"").unwrap(), Value::str("abcd"));
    assert_eq!(eval("\"ab\" * 3").unwrap(), Value::str("ababab"));
    let scope = scope_with(vec![("x", Value::int(5))]);
    assert_eq!(eval_in("\"x is #{x}\"", &scope).unwrap(), Value::str("x is 5"));
    assert_eq!(eval("\"a\\tb\"").unwrap(), Value::str("a\tb"));
}

#[test]
fn boolean_operators_are_lazy() {
    assert_eq!(eval("false && undefined_thing").unwrap(), Value::bool(false));
    assert_eq!(eval("true || undefined_thing").unwrap(), Value::bool(true));
    assert_eq!(eval("nil || 3").unwrap(), Value::int(3));
    assert_eq!(eval("1 && 2").unwrap(), Value::int(2));
}

#[test]
fn identifiers_resolve_from_the_scope() {
    let scope = scope_with(vec![("count", Value::int(41))]);
    assert_eq!(eval_in("count + 1", &scope).unwrap(), Value::int(42));
    let err = eval("missing").unwrap_err();
    assert_eq!(err, EvalError::undefined_name("missing"));
}

#[test]
fn array_literals_and_indexing() {
    assert_eq!(eval("[1, 2, 3][1]").unwrap(), Value::int(2));
    assert_eq!(eval("[1, 2, 3][-1]").unwrap(), Value::int(3));
    assert_eq!(eval("[1, 2, 3][0, 2]").unwrap(), ints(&[1, 2]));
    assert_eq!(eval("[1, 2, 3][1..2]").unwrap(), ints(&[2, 3]));
    assert_eq!(eval("[1, 2, 3][5]").unwrap(), Value::Nil);
    assert_eq!(eval("[*[1, 2], 3]").unwrap(), ints(&[1, 2, 3]));
}

#[test]
fn hash_literals_and_lookup() {
    assert_eq!(eval("{a: 1, :b => 2}[:b]").unwrap(), Value::int(2));
    assert_eq!(eval("{\"k\" => 3}[\"k\"]").unwrap(), Value::int(3));
    assert_eq!(eval("{a: 1}[:missing]").unwrap(), Value::Nil);
    assert_eq!(eval("{a: 1, b: 2}.keys").unwrap(), Value::array(vec![Value::sym("a"), Value::sym("b")]));
}

#[test]
fn ranges() {
    assert_eq!(eval("(1..4).to_a").unwrap(), ints(&[1, 2, 3, 4]));
    assert_eq!(eval("(1...4).sum").unwrap(), Value::int(6));
    assert_eq!(eval("(1..10).include?(5)").unwrap(), Value::bool(true));
    assert_eq!(eval("(1..3) == (1..3)").unwrap(), Value::bool(true));
}

#[test]
fn builtin_methods() {
    assert_eq!(eval("[3, 1, 2].sort").unwrap(), ints(&[1, 2, 3]));
    assert_eq!(eval("\"hello\".upcase").unwrap(), Value::str("HELLO"));
    assert_eq!(eval("[1, 2, 3].length").unwrap(), Value::int(3));
    assert_eq!(eval("(-5).abs").unwrap(), Value::int(5));
    assert_eq!(eval("[1, nil, 2].compact").unwrap(), ints(&[1, 2]));
    assert_eq!(eval("\"a,b,c\".split(\",\")").unwrap(), strs(&["a", "b", "c"]));
    assert_eq!(eval("[1, 2].join(\"-\")").unwrap(), Value::str("1-2"));
}

#[test]
fn iterator_blocks() {
    assert_eq!(eval("[1, 2, 3].map { |n| n * 2 }").unwrap(), ints(&[2, 4, 6]));
    assert_eq!(eval("[1, 2, 3].select { |n| n.odd? }").unwrap(), ints(&[1, 3]));
    assert_eq!(eval("[1, 2, 3].reject { |n| n.odd? }").unwrap(), ints(&[2]));
    assert_eq!(eval("[1, 2, 3].find { |n| n > 1 }").unwrap(), Value::int(2));
    assert_eq!(eval("[1, 2, 3].any? { |n| n > 2 }").unwrap(), Value::bool(true));
    assert_eq!(eval("[1, 2, 3].all? { |n| n > 2 }").unwrap(), Value::bool(false));
    assert_eq!(eval("[1, 2, 3].sum { |n| n * n }").unwrap(), Value::int(14));
    assert_eq!(eval("(1..3).map { |n| n + 1 }").unwrap(), ints(&[2, 3, 4]));
}

#[test]
fn symbol_proc_blocks() {
    assert_eq!(eval("[1, 2, 3].map(&:to_s)").unwrap(), strs(&["1", "2", "3"]));
    assert_eq!(eval("[1, 2, 3].select(&:even?)").unwrap(), ints(&[2]));
}

#[test]
fn block_parameters_shadow_and_restore() {
    let scope = scope_with(vec![("n", Value::int(10))]);
    let source = "doubled = [1, 2].map { |n| n * 2 }\nn";
    assert_eq!(eval_in(source, &scope).unwrap(), Value::int(10));
}

#[test]
fn hash_iteration_destructures_pairs() {
    let result = eval("{a: 1, b: 2}.map { |k, v| v }").unwrap();
    assert_eq!(result, ints(&[1, 2]));
}

#[test]
fn regex_matching() {
    assert_eq!(eval("\"hello\" =~ /l+/").unwrap(), Value::int(2));
    assert_eq!(eval("/z/ =~ \"abc\"").unwrap(), Value::Nil);
    assert_eq!(eval("\"hello\".match(/l+/)").unwrap(), Value::str("ll"));
    assert_eq!(eval("\"ab12\".match?(/\\d+/)").unwrap(), Value::bool(true));
    assert_eq!(eval("\"a.b\".gsub(/\\./, \"-\")").unwrap(), Value::str("a-b"));
}

#[test]
fn conditionals() {
    assert_eq!(eval("1 > 2 ? :yes : :no").unwrap(), Value::sym("no"));
    assert_eq!(eval("if 1 > 2\n  :a\nelse\n  :b\nend").unwrap(), Value::sym("b"));
    assert_eq!(eval("5 if true").unwrap(), Value::int(5));
    assert_eq!(eval("5 unless true").unwrap(), Value::Nil);
}

#[test]
fn case_dispatch() {
    let source = "case 5\nwhen 1..3 then :low\nwhen 4..6 then :mid\nelse :high\nend";
    assert_eq!(eval(source).unwrap(), Value::sym("mid"));
}

#[test]
fn assignment_stays_in_the_scratch_layer() {
    assert_eq!(eval("x = 2\nx * 3").unwrap(), Value::int(6));
    assert_eq!(eval("x = 1\nx += 4\nx").unwrap(), Value::int(5));
    assert_eq!(eval("y ||= 9").unwrap(), Value::int(9));
    assert_eq!(eval("a, b = [1, 2]\na + b").unwrap(), Value::int(3));
}

#[test]
fn while_modifier_loops() {
    assert_eq!(eval("i = 0\ni += 1 while i < 3\ni").unwrap(), Value::int(3));
}

#[test]
fn begin_rescue_catches_raised_errors() {
    let source = "begin\n  1 / 0\nrescue => e\n  e\nend";
    assert_eq!(eval(source).unwrap(), Value::error("divided by 0"));
    assert_eq!(eval("(1 / 0) rescue :saved").unwrap(), Value::sym("saved"));
}

#[test]
fn unknown_methods_are_silent() {
    let err = eval("5.frobnicate").unwrap_err();
    assert!(err.is_silent());
    let err = eval("helper(1, 2)").unwrap_err();
    assert!(err.is_silent());
}

#[test]
fn bare_references_are_silent_but_wrong_arity_is_not() {
    let err = eval("\"a\".sub").unwrap_err();
    assert!(err.is_silent());
    let err = eval("\"a\".sub(\"b\")").unwrap_err();
    assert!(matches!(err, EvalError::Raised(_)));
}

#[test]
fn unary_operators() {
    assert_eq!(eval("!true").unwrap(), Value::bool(false));
    assert_eq!(eval("!nil").unwrap(), Value::bool(true));
    assert_eq!(eval("-(2 ** 3)").unwrap(), Value::int(-8));
    assert_eq!(eval("~0").unwrap(), Value::int(-1));
}

#[test]
fn defined_names_the_binding_kind() {
    let scope = scope_with(vec![("x", Value::int(1))]);
    assert_eq!(eval_in("defined?(x)", &scope).unwrap(), Value::str("local-variable"));
    assert_eq!(eval("defined?(zzz)").unwrap(), Value::Nil);
}

#[test]
fn safe_navigation_short_circuits_on_nil() {
    let scope = scope_with(vec![("x", Value::Nil)]);
    assert_eq!(eval_in("x&.length", &scope).unwrap(), Value::Nil);
}

#[test]
fn yield_and_return_surface_as_raised() {
    assert_eq!(eval("yield").unwrap_err(), EvalError::raised("no block given (yield)"));
    assert!(matches!(eval("return 1").unwrap_err(), EvalError::Raised(_)));
}

#[test]
fn integer_overflow_raises_instead_of_wrapping() {
    let err = eval("9_223_372_036_854_775_807 + 1").unwrap_err();
    assert!(matches!(err, EvalError::Raised(_)));
}

// ----------------------------------------------------------------------------------------------------------------
// HELPERS
// ----------------------------------------------------------------------------------------------------------------
fn eval_in(source: &str, scope: &Scope) -> Result<Value, EvalError> {
    let tree = parse_source(source).unwrap();
    let evaluator = Evaluator::new();
    let mut bindings = Bindings::new(scope);
    evaluator.evaluate(tree.root_node(), source, &mut bindings)
}

fn eval(source: &str) -> Result<Value, EvalError> {
    eval_in(source, &Scope::new())
}

fn scope_with(pairs: Vec<(&str, Value)>) -> Scope {
    pairs.into_iter().map(|(name, value)| (name.to_string(), value)).collect()
}

fn ints(values: &[i64]) -> Value {
    Value::array(values.iter().map(|i| Value::int(*i)).collect())
}

fn strs(values: &[&str]) -> Value {
    Value::array(values.iter().map(|s| Value::str(*s)).collect())
}

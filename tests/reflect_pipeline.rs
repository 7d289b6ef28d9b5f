#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::PathBuf;

use assert_reflect::assertions::{AssertOptions, Driver, RecordingHook};
use assert_reflect::config::ReflectConfig;
use assert_reflect::scope::{LexicalContext, Scope};
use assert_reflect::source_loader::CallSite;
use assert_reflect::value::Value;

struct Fixture {
    path: PathBuf,
}

impl Fixture {
    fn new(name: &str, code: &str) -> Fixture {
        let path = std::env::temp_dir().join(format!("reflect_pipeline_{name}.rb"));
        fs::write(&path, code).unwrap();
        Fixture { path }
    }

    fn call_site(&self, line: usize) -> CallSite {
        CallSite::new(&self.path, line)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn driver() -> (Driver, RecordingHook) {
    let hook = RecordingHook::default();
    let driver = Driver::with_hook(ReflectConfig::default(), Box::new(hook.clone()));
    (driver, hook)
}

fn scope(pairs: &[(&str, Value)]) -> LexicalContext {
    let scope: Scope = pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    LexicalContext::new(scope)
}

#[test]
fn arithmetic_failure_shows_the_partial_sums() {
    let fixture = Fixture::new("arithmetic", "x = 1\nassert { 1 + 1 == 3 }\n");
    let (mut driver, hook) = driver();
    assert!(!driver.assert(&LexicalContext::default(), &fixture.call_site(2), AssertOptions::default()));

    let message = &hook.messages()[0];
    let expected = "\
1 + 1 == 3
    --> false
     1 + 1 --> 2
1 + 1 == 3 --> false
";
    assert_eq!(message, expected);
}

#[test]
fn regex_mismatch_shows_the_subject_and_the_match() {
    let fixture = Fixture::new("regex", "assert { z =~ /ab/ }\n");

    let passing = scope(&[("z", Value::str("xab"))]);
    let (mut d, hook) = driver();
    assert!(d.assert(&passing, &fixture.call_site(1), AssertOptions::default()));
    assert!(hook.messages().is_empty());

    let failing = scope(&[("z", Value::str("xyz"))]);
    let (mut d, hook) = driver();
    assert!(!d.assert(&failing, &fixture.call_site(1), AssertOptions::default()));
    let message = &hook.messages()[0];
    assert!(message.contains("z --> \"xyz\""));
    assert!(message.contains("z =~ /ab/ --> nil"));
    // The bare regex literal matches itself; it never shows up.
    assert!(!message.contains("/ab/ --> /ab/"));
}

#[test]
fn block_parameters_bind_from_the_side_channel() {
    let fixture = Fixture::new("block_param", "items.each { |n| assert { n > 0 } }\n");
    let context = scope(&[(
        "items",
        Value::array(vec![Value::int(3), Value::int(-1)]),
    )])
    .with_block_args(vec![Value::int(-1)]);
    let (mut driver, hook) = driver();
    assert!(!driver.assert(&context, &fixture.call_site(1), AssertOptions::default()));

    let message = &hook.messages()[0];
    assert!(message.contains("n --> -1"));
    assert!(message.contains("n > 0 --> false"));
}

#[test]
fn multi_line_assertions_reflect_like_single_line_ones() {
    let single = Fixture::new("single_line", "assert { total == limit - 1 }\n");
    let multi = Fixture::new(
        "multi_line",
        "assert do\n  total ==\n    limit - 1\nend\n",
    );
    let context = scope(&[("total", Value::int(5)), ("limit", Value::int(5))]);

    let (mut d1, hook1) = driver();
    assert!(!d1.assert(&context, &single.call_site(1), AssertOptions::default()));
    let (mut d2, hook2) = driver();
    assert!(!d2.assert(&context, &multi.call_site(1), AssertOptions::default()));

    assert_eq!(hook1.messages(), hook2.messages());
}

#[test]
fn deny_is_the_dual_of_assert() {
    let fixture = Fixture::new("deny", "deny { count.zero? }\n");

    let failing = scope(&[("count", Value::int(0))]);
    let (mut d, hook) = driver();
    assert!(!d.deny(&failing, &fixture.call_site(1), AssertOptions::default()));
    let message = &hook.messages()[0];
    assert!(message.starts_with("count.zero?\n    --> true\n"));
    assert!(message.contains("count --> 0"));

    let passing = scope(&[("count", Value::int(2))]);
    let (mut d, hook) = driver();
    assert!(d.deny(&passing, &fixture.call_site(1), AssertOptions::default()));
    assert!(hook.messages().is_empty());
}

#[test]
fn arrows_share_a_column_in_every_report() {
    let fixture = Fixture::new(
        "alignment",
        "assert { items.size == expected && items.first == \"a\" }\n",
    );
    let context = scope(&[
        ("items", Value::array(vec![Value::str("b"), Value::str("c")])),
        ("expected", Value::int(3)),
    ]);
    let (mut driver, hook) = driver();
    assert!(!driver.assert(&context, &fixture.call_site(1), AssertOptions::default()));

    let message = &hook.messages()[0];
    let columns: Vec<usize> = message
        .lines()
        .skip(2)
        .filter_map(|line| line.find("--> "))
        .collect();
    assert!(columns.len() > 2);
    assert!(columns.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn interpolated_strings_report_their_expansion() {
    let fixture = Fixture::new("interpolation", "assert { \"v#{n}\" == \"v2\" }\n");
    let context = scope(&[("n", Value::int(3))]);
    let (mut driver, hook) = driver();
    assert!(!driver.assert(&context, &fixture.call_site(1), AssertOptions::default()));

    let message = &hook.messages()[0];
    assert!(message.contains("n --> 3"));
    assert!(message.contains("\"v#{n}\" --> \"v3\""));
    // The plain right-hand literal is a self-match and stays out.
    assert!(!message.contains("\"v2\" --> \"v2\""));
}

#[test]
fn queued_diagnostics_lead_the_report_and_drain() {
    let fixture = Fixture::new("diagnostics", "assert { ready }\n");
    let context = scope(&[("ready", Value::bool(false))]);
    let (mut driver, hook) = driver();
    driver.add_diagnostic("while provisioning the fixture");
    driver.add_diagnostic("while provisioning the fixture");
    assert!(!driver.assert(&context, &fixture.call_site(1), AssertOptions::default()));

    let message = &hook.messages()[0];
    assert_eq!(message.matches("while provisioning the fixture").count(), 1);
    assert!(message.starts_with("while provisioning the fixture\n"));

    // Queue is one-shot: a second failure has no stale lines.
    let messages_before = hook.messages().len();
    assert!(!driver.assert(&context, &fixture.call_site(1), AssertOptions::default()));
    let second = &hook.messages()[messages_before];
    assert!(!second.contains("while provisioning the fixture"));
}

#[test]
fn stale_line_information_degrades_to_a_plain_message() {
    let fixture = Fixture::new("stale", "puts 1\n");
    let (mut driver, hook) = driver();
    assert!(!driver.assert(&LexicalContext::default(), &fixture.call_site(1), AssertOptions::default()));

    let message = &hook.messages()[0];
    assert!(message.contains("reflection unavailable"));
    assert!(!message.contains("-->"));
}

#[test]
fn method_chains_capture_each_link() {
    let fixture = Fixture::new(
        "chain",
        "assert { words.sort.first.upcase == \"APPLE\" }\n",
    );
    let context = scope(&[(
        "words",
        Value::array(vec![Value::str("pear"), Value::str("fig")]),
    )]);
    let (mut driver, hook) = driver();
    assert!(!driver.assert(&context, &fixture.call_site(1), AssertOptions::default()));

    let message = &hook.messages()[0];
    assert!(message.contains("words.sort --> [\"fig\", \"pear\"]"));
    assert!(message.contains("words.sort.first --> \"fig\""));
    assert!(message.contains("words.sort.first.upcase --> \"FIG\""));
}

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

use crate::config::ReflectConfig;
use crate::interpreter::{Bindings, Evaluator};
use crate::reflector::{reflect_body, Capture};
use crate::report;
use crate::scope::{bind_block_args, LexicalContext};
use crate::source_loader::{find_assertion_block, locate, CallSite};
use crate::value::Value;

/// Receives failure messages. The driver never decides how a failure is
/// delivered; the hook does.
pub trait TestHook {
    fn flunk(&mut self, message: &str);
}

/// Default hook: fail the surrounding test by panicking with the report.
#[derive(Debug, Default)]
pub struct PanicHook;

impl TestHook for PanicHook {
    // Panicking is this hook's whole job.
    #[allow(clippy::panic)]
    fn flunk(&mut self, message: &str) {
        panic!("{message}");
    }
}

/// Test hook that records messages instead of failing, shared through a
/// handle so callers can read them after the driver consumed the hook.
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    messages: Rc<RefCell<Vec<String>>>,
}

impl RecordingHook {
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl TestHook for RecordingHook {
    fn flunk(&mut self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// Caller-queued diagnostic lines, delivered ahead of the next failure
/// message and dropped after the next assertion either way. Duplicate
/// lines are queued once.
#[derive(Debug, Default)]
pub struct DiagnosticsQueue {
    lines: Vec<String>,
}

impl DiagnosticsQueue {
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        if !self.lines.contains(&line) {
            self.lines.push(line);
        }
    }

    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Per-call options.
#[derive(Default)]
pub struct AssertOptions {
    /// A user-supplied line printed ahead of the report.
    pub diagnostic: Option<String>,
    /// Produces one more diagnostic line, called only on failure.
    pub diagnose: Option<Box<dyn FnOnce() -> String>>,
    /// The most recent block-argument values, for binding enclosing block
    /// parameters during re-evaluation.
    pub args: Option<Vec<Value>>,
}

impl AssertOptions {
    pub fn diagnostic(line: impl Into<String>) -> AssertOptions {
        AssertOptions {
            diagnostic: Some(line.into()),
            ..AssertOptions::default()
        }
    }
}

/// Everything one reflection pass produced: the canonical source text, the
/// capture table, and the overall value of the asserted body.
struct Reflected {
    text: String,
    captures: Vec<Capture>,
    value: Value,
}

/// The public assertion surface. Owns the diagnostics queue and the test
/// hook; borrows the caller's lexical context per call.
pub struct Driver {
    config: ReflectConfig,
    evaluator: Evaluator,
    hook: Box<dyn TestHook>,
    diagnostics: DiagnosticsQueue,
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new(ReflectConfig::default())
    }
}

impl Driver {
    pub fn new(config: ReflectConfig) -> Driver {
        Driver::with_hook(config, Box::new(PanicHook))
    }

    pub fn with_hook(config: ReflectConfig, hook: Box<dyn TestHook>) -> Driver {
        Driver {
            config,
            evaluator: Evaluator::new(),
            hook,
            diagnostics: DiagnosticsQueue::default(),
        }
    }

    /// Queue a diagnostic line for the next assertion. One-shot: the queue
    /// is drained when that assertion runs, whether it passes or not.
    pub fn add_diagnostic(&mut self, line: impl Into<String>) {
        self.diagnostics.push(line);
    }

    /// Evaluate the assertion block found at `call_site` and flunk with a
    /// reflective report when its value is falsy. Returns true on success,
    /// never a bare false without flunking first.
    pub fn assert(&mut self, context: &LexicalContext, call_site: &CallSite, options: AssertOptions) -> bool {
        self.check(context, call_site, options, false)
    }

    /// Dual of `assert`: flunks when the block value is truthy.
    pub fn deny(&mut self, context: &LexicalContext, call_site: &CallSite, options: AssertOptions) -> bool {
        self.check(context, call_site, options, true)
    }

    /// Historical alias spelling of `deny`.
    pub fn denigh(&mut self, context: &LexicalContext, call_site: &CallSite, options: AssertOptions) -> bool {
        self.deny(context, call_site, options)
    }

    /// Like `assert`, but the caller supplies the already-computed block
    /// value; reflection only builds the report.
    pub fn assert_with(
        &mut self,
        context: &LexicalContext,
        call_site: &CallSite,
        options: AssertOptions,
        block: impl FnOnce() -> Value,
    ) -> bool {
        self.check_with(context, call_site, options, block(), false)
    }

    /// Dual of `assert_with`.
    pub fn deny_with(
        &mut self,
        context: &LexicalContext,
        call_site: &CallSite,
        options: AssertOptions,
        block: impl FnOnce() -> Value,
    ) -> bool {
        self.check_with(context, call_site, options, block(), true)
    }

    /// The non-reflective fallback assertion.
    pub fn assert_classic(&mut self, value: &Value, message: Option<&str>) -> bool {
        let drained = self.diagnostics.drain();
        if value.is_truthy() {
            return true;
        }
        let body = match message {
            Some(prefix) => format!("{prefix}: {} is not true.", value.inspect()),
            None => format!("{} is not true.", value.inspect()),
        };
        self.flunk_assembled(drained, AssertOptions::default(), &body)
    }

    fn check(
        &mut self,
        context: &LexicalContext,
        call_site: &CallSite,
        options: AssertOptions,
        negated: bool,
    ) -> bool {
        let drained = self.diagnostics.drain();
        let name = if negated { "deny" } else { "assert" };
        match self.reflect_assertion(context, call_site, &options, name) {
            Ok(reflected) => {
                let passed = reflected.value.is_truthy() != negated;
                if passed {
                    debug!("{name} at {}:{} passed", call_site.path.display(), call_site.line);
                    return true;
                }
                let body = report::format_report(
                    &reflected.text,
                    &reflected.value,
                    &reflected.captures,
                    &self.config,
                );
                self.flunk_assembled(drained, options, &body)
            }
            Err(e) => {
                warn!(
                    "reflection unavailable at {}:{}: {e}",
                    call_site.path.display(),
                    call_site.line
                );
                let expected = if negated { "is not false" } else { "is not true" };
                let body = format!(
                    "{name} at {}:{} {expected}. (reflection unavailable: {e})",
                    call_site.path.display(),
                    call_site.line
                );
                self.flunk_assembled(drained, options, &body)
            }
        }
    }

    fn check_with(
        &mut self,
        context: &LexicalContext,
        call_site: &CallSite,
        options: AssertOptions,
        value: Value,
        negated: bool,
    ) -> bool {
        let drained = self.diagnostics.drain();
        let name = if negated { "deny" } else { "assert" };
        if value.is_truthy() != negated {
            return true;
        }
        let body = match self.reflect_assertion(context, call_site, &options, name) {
            Ok(reflected) => {
                report::format_report(&reflected.text, &value, &reflected.captures, &self.config)
            }
            Err(e) => {
                warn!(
                    "reflection unavailable at {}:{}: {e}",
                    call_site.path.display(),
                    call_site.line
                );
                let expected = if negated { "is not false" } else { "is not true" };
                format!("{} {expected}. (reflection unavailable: {e})", value.inspect())
            }
        };
        self.flunk_assembled(drained, options, &body)
    }

    /// One reflection pass: locate, find the named call's block, bind the
    /// block arguments, walk for captures, then evaluate the body once more
    /// with fresh scratch state for the overall value. A body that cannot
    /// evaluate yields an error value, which is falsy.
    fn reflect_assertion(
        &self,
        context: &LexicalContext,
        call_site: &CallSite,
        options: &AssertOptions,
        name: &str,
    ) -> Result<Reflected, crate::error::ReflectError> {
        let located = locate(call_site, &self.config)?;
        let site = find_assertion_block(&located, &located.text, name)?;
        let args = options
            .args
            .clone()
            .or_else(|| context.block_args.clone())
            .unwrap_or_default();
        let pairs = bind_block_args(&site.parameter_names, &args);

        let mut bindings = Bindings::with_block_bindings(&context.scope, pairs.clone());
        let reflection = reflect_body(&self.evaluator, &site.body, &located.text, &mut bindings)?;

        let mut fresh = Bindings::with_block_bindings(&context.scope, pairs);
        let value = match self.evaluator.evaluate_body(&site.body, &located.text, &mut fresh) {
            Ok(value) => value,
            Err(e) => Value::error(e.message()),
        };
        Ok(Reflected {
            text: reflection.text,
            captures: reflection.captures,
            value,
        })
    }

    /// Message order: queued diagnostics, the per-call diagnostic line, the
    /// report body, then the post-failure diagnose line.
    fn flunk_assembled(&mut self, drained: Vec<String>, options: AssertOptions, body: &str) -> bool {
        let mut message = String::new();
        for line in drained {
            message.push_str(&line);
            message.push('\n');
        }
        if let Some(line) = options.diagnostic {
            message.push_str(&line);
            message.push('\n');
        }
        message.push_str(body);
        if !body.ends_with('\n') {
            message.push('\n');
        }
        if let Some(diagnose) = options.diagnose {
            message.push_str(&diagnose());
            message.push('\n');
        }
        self.hook.flunk(&message);
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use std::fs;
    use std::path::PathBuf;

    fn write_fixture(name: &str, code: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, code).unwrap();
        path
    }

    fn recording_driver() -> (Driver, RecordingHook) {
        let hook = RecordingHook::default();
        let driver = Driver::with_hook(ReflectConfig::default(), Box::new(hook.clone()));
        (driver, hook)
    }

    #[test]
    fn passing_assertion_returns_true_silently() {
        let path = write_fixture("driver_pass.rb", "assert { 1 + 1 == 2 }\n");
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();
        let site = CallSite::new(&path, 1);
        assert!(driver.assert(&context, &site, AssertOptions::default()));
        assert!(hook.messages().is_empty());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn failing_assertion_flunks_with_the_report() {
        let path = write_fixture("driver_fail.rb", "assert { 1 + 1 == 3 }\n");
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();
        let site = CallSite::new(&path, 1);
        assert!(!driver.assert(&context, &site, AssertOptions::default()));
        let messages = hook.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("1 + 1 == 3\n    --> false\n"));
        assert!(messages[0].contains("1 + 1 --> 2"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn deny_flunks_on_truthy_and_passes_on_falsy() {
        let path = write_fixture("driver_deny.rb", "deny { 2 > 1 }\n");
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();
        let site = CallSite::new(&path, 1);
        assert!(!driver.deny(&context, &site, AssertOptions::default()));
        assert!(hook.messages()[0].contains("--> true"));
        fs::remove_file(&path).unwrap();

        let path = write_fixture("driver_deny_pass.rb", "deny { nil }\n");
        let (mut driver, hook) = recording_driver();
        let site = CallSite::new(&path, 1);
        assert!(driver.deny(&context, &site, AssertOptions::default()));
        assert!(hook.messages().is_empty());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn diagnostics_queue_drains_on_every_outcome() {
        let path = write_fixture("driver_diag.rb", "assert { true }\nassert { false }\n");
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();

        driver.add_diagnostic("first run note");
        driver.add_diagnostic("first run note");
        assert!(driver.assert(&context, &CallSite::new(&path, 1), AssertOptions::default()));
        assert!(driver.diagnostics.is_empty());

        driver.add_diagnostic("second run note");
        assert!(!driver.assert(&context, &CallSite::new(&path, 2), AssertOptions::default()));
        let message = &hook.messages()[0];
        assert!(message.starts_with("second run note\n"));
        assert!(!message.contains("first run note"));
        assert!(driver.diagnostics.is_empty());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn diagnostic_and_diagnose_lines_frame_the_report() {
        let path = write_fixture("driver_frame.rb", "assert { false }\n");
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();
        let options = AssertOptions {
            diagnostic: Some("checking the frame".to_string()),
            diagnose: Some(Box::new(|| "after the fact".to_string())),
            args: None,
        };
        assert!(!driver.assert(&context, &CallSite::new(&path, 1), options));
        let message = &hook.messages()[0];
        assert!(message.starts_with("checking the frame\n"));
        assert!(message.ends_with("after the fact\n"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn block_arguments_bind_enclosing_parameters() {
        let path = write_fixture(
            "driver_block_args.rb",
            "items.each { |n| assert { n > 0 } }\n",
        );
        let scope: Scope = [(
            "items".to_string(),
            Value::array(vec![Value::int(1), Value::int(-1)]),
        )]
        .into_iter()
        .collect();
        let context = LexicalContext::new(scope).with_block_args(vec![Value::int(-1)]);
        let (mut driver, hook) = recording_driver();
        assert!(!driver.assert(&context, &CallSite::new(&path, 1), AssertOptions::default()));
        let message = &hook.messages()[0];
        assert!(message.contains("n --> -1"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unsupported_source_degrades_to_a_plain_message() {
        let path = write_fixture(
            "driver_heredoc.rb",
            "assert { <<~TEXT == x\n  hi\nTEXT\n}\n",
        );
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();
        assert!(!driver.assert(&context, &CallSite::new(&path, 1), AssertOptions::default()));
        let message = &hook.messages()[0];
        assert!(message.contains("reflection unavailable"));
        assert!(!message.contains("-->"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn assert_with_uses_the_supplied_value() {
        let path = write_fixture("driver_with.rb", "assert { flag }\n");
        let (mut driver, hook) = recording_driver();
        let context = LexicalContext::default();
        let site = CallSite::new(&path, 1);
        assert!(driver.assert_with(&context, &site, AssertOptions::default(), || Value::bool(true)));
        assert!(!driver.assert_with(&context, &site, AssertOptions::default(), || Value::bool(false)));
        let message = &hook.messages()[0];
        assert!(message.starts_with("flag\n    --> false\n"));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn assert_classic_reports_the_inspect_form() {
        let (mut driver, hook) = recording_driver();
        assert!(driver.assert_classic(&Value::int(1), None));
        assert!(!driver.assert_classic(&Value::Nil, Some("flag check")));
        assert_eq!(hook.messages(), ["flag check: nil is not true.\n"]);
    }
}

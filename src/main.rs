#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::exit)]

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use log::info;

use assert_reflect::assertions::{AssertOptions, Driver, RecordingHook};
use assert_reflect::config::ReflectConfig;
use assert_reflect::scope::{LexicalContext, Scope};
use assert_reflect::source_loader::CallSite;
use assert_reflect::value::Value;

/// Diagnose a failed assert/deny block in a Ruby file: reconstruct the
/// asserted expression, re-evaluate its subexpressions against the given
/// bindings, and print the expression --> value report.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Ruby file containing the assertion.
    file: PathBuf,
    /// 1-based line of the assert/deny call.
    line: usize,
    /// JSON object mapping variable names to their values at the call site.
    #[arg(long, default_value = "{}")]
    bindings: String,
    /// JSON array with the most recent block-argument values.
    #[arg(long)]
    block_args: Option<String>,
    /// Expect a falsy block result instead of a truthy one.
    #[arg(long)]
    deny: bool,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    info!("diagnosing {}:{}", args.file.display(), args.line);

    let scope = parse_bindings(&args.bindings)?;
    let mut context = LexicalContext::new(scope);
    if let Some(raw) = &args.block_args {
        context = context.with_block_args(parse_block_args(raw)?);
    }

    let hook = RecordingHook::default();
    let mut driver = Driver::with_hook(ReflectConfig::from_env(), Box::new(hook.clone()));
    let call_site = CallSite::new(&args.file, args.line);

    let passed = if args.deny {
        driver.deny(&context, &call_site, AssertOptions::default())
    } else {
        driver.assert(&context, &call_site, AssertOptions::default())
    };

    if passed {
        println!("{} passed", if args.deny { "denial" } else { "assertion" });
        return Ok(ExitCode::SUCCESS);
    }
    for message in hook.messages() {
        print!("{message}");
    }
    Ok(ExitCode::FAILURE)
}

fn parse_bindings(raw: &str) -> Result<Scope, Box<dyn Error>> {
    let parsed: serde_json::Value = serde_json::from_str(raw)?;
    match parsed {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, Value::from(value)))
            .collect()),
        _ => Err("--bindings must be a JSON object".into()),
    }
}

fn parse_block_args(raw: &str) -> Result<Vec<Value>, Box<dyn Error>> {
    let parsed: serde_json::Value = serde_json::from_str(raw)?;
    match parsed {
        serde_json::Value::Array(items) => Ok(items.into_iter().map(Value::from).collect()),
        _ => Err("--block-args must be a JSON array".into()),
    }
}

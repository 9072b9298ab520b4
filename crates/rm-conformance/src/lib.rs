#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use rm_matcher::{Arg, any_data, any_double, any_int};
use rm_protocol::{Reply, Value};
use rm_registry::{Registry, Resolved, ResolveError};

/// Locations the harness reads fixtures from.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        }
    }
}

/// Per-fixture pass/fail tally. `failed` carries one line per mismatching
/// resolve step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureReport {
    pub fixture: String,
    pub total: usize,
    pub passed: usize,
    pub failed: Vec<String>,
}

#[derive(Debug)]
pub enum HarnessError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    Register {
        command: String,
        #[serde(default)]
        args: Vec<FixtureArg>,
        #[serde(default)]
        outcomes: Vec<FixtureOutcome>,
    },
    RegisterGeneric {
        command: String,
        #[serde(default)]
        outcomes: Vec<FixtureOutcome>,
    },
    Resolve {
        command: String,
        #[serde(default)]
        args: Vec<FixtureValue>,
        want: Want,
    },
    Clear,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureValue {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl FixtureValue {
    fn to_value(&self) -> Value {
        match self {
            Self::Str(text) => Value::Str(text.clone()),
            Self::Bytes(bytes) => Value::Bytes(bytes.clone()),
            Self::Int(n) => Value::Int(*n),
            Self::Float(x) => Value::Float(*x),
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Nil => Value::Nil,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureArg {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    AnyInt,
    AnyDouble,
    AnyData,
}

impl FixtureArg {
    fn to_arg(&self) -> Arg {
        match self {
            Self::Str(text) => Arg::literal(text.clone()),
            Self::Bytes(bytes) => Arg::literal(bytes.clone()),
            Self::Int(n) => Arg::literal(*n),
            Self::Float(x) => Arg::literal(*x),
            Self::Bool(flag) => Arg::literal(*flag),
            Self::Nil => Arg::Literal(Value::Nil),
            Self::AnyInt => any_int(),
            Self::AnyDouble => any_double(),
            Self::AnyData => any_data(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureReply {
    Nil,
    Simple(String),
    Bulk(String),
    Int(i64),
    Array(Vec<FixtureReply>),
}

impl FixtureReply {
    fn to_reply(&self) -> Reply {
        match self {
            Self::Nil => Reply::Nil,
            Self::Simple(text) => Reply::SimpleString(text.clone()),
            Self::Bulk(text) => Reply::BulkString(text.as_bytes().to_vec()),
            Self::Int(n) => Reply::Integer(*n),
            Self::Array(items) => Reply::Array(items.iter().map(Self::to_reply).collect()),
        }
    }
}

/// Outcome writes applied in order to one registration handle, so fixtures
/// can exercise last-write-wins and the response/error mutual clearing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureOutcome {
    Response(FixtureReply),
    Map(Vec<(String, String)>),
    Error(String),
    Unset,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Want {
    Response(FixtureReply),
    Error(String),
    Unregistered,
}

/// Run one fixture script against a fresh registry. Only resolve steps
/// count toward the tally; register steps are setup.
pub fn run_fixture(cfg: &HarnessConfig, file_name: &str) -> Result<FixtureReport, HarnessError> {
    let raw = fs::read_to_string(cfg.fixture_root.join(file_name))?;
    let fixture: Fixture = serde_json::from_str(&raw)?;

    let mut registry = Registry::new();
    let mut report = FixtureReport {
        fixture: fixture.name,
        total: 0,
        passed: 0,
        failed: Vec::new(),
    };

    for (idx, step) in fixture.steps.iter().enumerate() {
        match step {
            Step::Register {
                command,
                args,
                outcomes,
            } => {
                let handle = registry.command(command, args.iter().map(FixtureArg::to_arg));
                apply_outcomes(&handle, outcomes);
            }
            Step::RegisterGeneric { command, outcomes } => {
                let handle = registry.generic_command(command);
                apply_outcomes(&handle, outcomes);
            }
            Step::Resolve {
                command,
                args,
                want,
            } => {
                let values: Vec<Value> = args.iter().map(FixtureValue::to_value).collect();
                let got = registry.resolve(command, &values);
                report.total += 1;
                if matches(want, &got) {
                    report.passed += 1;
                } else {
                    report
                        .failed
                        .push(format!("step {idx}: {command} resolved to {got:?}"));
                }
            }
            Step::Clear => registry.clear(),
        }
    }

    Ok(report)
}

/// Run every `*.json` fixture under the configured root, sorted by file
/// name for a stable report order.
pub fn run_all(cfg: &HarnessConfig) -> Result<Vec<FixtureReport>, HarnessError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(&cfg.fixture_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") {
            names.push(name);
        }
    }
    names.sort();

    let mut reports = Vec::with_capacity(names.len());
    for name in &names {
        reports.push(run_fixture(cfg, name)?);
    }
    Ok(reports)
}

fn apply_outcomes(handle: &rm_registry::CommandHandle, outcomes: &[FixtureOutcome]) {
    for outcome in outcomes {
        match outcome {
            FixtureOutcome::Response(reply) => handle.expect(reply.to_reply()),
            FixtureOutcome::Map(entries) => handle.expect_map(entries.iter().cloned()),
            FixtureOutcome::Error(message) => handle.expect_error(message.clone()),
            FixtureOutcome::Unset => {}
        }
    }
}

fn matches(want: &Want, got: &Result<Resolved, ResolveError>) -> bool {
    match (want, got) {
        (Want::Response(reply), Ok(Resolved::Response(actual))) => reply.to_reply() == *actual,
        (Want::Error(message), Ok(Resolved::Error(actual))) => message == actual,
        (Want::Unregistered, Err(ResolveError::UnregisteredCommand { .. })) => true,
        _ => false,
    }
}

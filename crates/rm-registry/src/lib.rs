#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rm_matcher::{Arg, args_match, generate_key, normalize_token};
use rm_protocol::{Reply, Value};

/// One registered command pattern: the canned outcome handed back when a
/// matching invocation resolves. Response and error are mutually clearing.
#[derive(Debug, Default)]
struct Expectation {
    response: Option<Reply>,
    error: Option<String>,
}

/// Mutable handle to a stored expectation, returned by registration.
///
/// The handle stays valid across later registrations; writes are
/// last-write-wins, and `expect`/`expect_error` clear each other so a
/// registration can never carry both a success value and a failure.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    slot: Rc<RefCell<Expectation>>,
}

impl CommandHandle {
    fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(Expectation::default())),
        }
    }

    /// Set the canned response, clearing any stored error.
    pub fn expect(&self, response: impl Into<Reply>) {
        let mut slot = self.slot.borrow_mut();
        slot.response = Some(response.into());
        slot.error = None;
    }

    /// Flatten key/value pairs into an alternating array of bulk strings and
    /// store it as the response. Iteration order of `entries` is preserved,
    /// so unordered map types give an unspecified flattening order.
    pub fn expect_map<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let mut flat = Vec::new();
        for (key, value) in entries {
            flat.push(Reply::BulkString(key.into()));
            flat.push(Reply::BulkString(value.into()));
        }
        let mut slot = self.slot.borrow_mut();
        slot.response = Some(Reply::Array(flat));
        slot.error = None;
    }

    /// Set the canned error, clearing any stored response.
    pub fn expect_error(&self, message: impl Into<String>) {
        let mut slot = self.slot.borrow_mut();
        slot.response = None;
        slot.error = Some(message.into());
    }
}

#[derive(Debug)]
struct FuzzyRegistration {
    command: Vec<u8>,
    args: Vec<Arg>,
    slot: Rc<RefCell<Expectation>>,
}

/// Outcome of a successful lookup: either the stored response or the stored
/// error payload. A registration nobody called `expect` on resolves to
/// `Response(Reply::Nil)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Response(Reply),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    UnregisteredCommand {
        command: String,
        args_preview: Option<String>,
    },
}

/// Table of registered expectations for one test fixture.
///
/// Construct one per test and hand it to the connection emulator by
/// reference; overwrite-on-register semantics make a shared instance a
/// cross-test correctness hazard, not just a contention point.
#[derive(Debug, Default)]
pub struct Registry {
    exact: HashMap<Vec<u8>, Rc<RefCell<Expectation>>>,
    fuzzy: Vec<FuzzyRegistration>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.fuzzy.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.fuzzy.is_empty()
    }

    /// Drop every registration, exact and fuzzy.
    pub fn clear(&mut self) {
        self.exact.clear();
        self.fuzzy.clear();
    }

    /// Register a command pattern and return a handle for setting its
    /// outcome.
    ///
    /// All-literal argument lists are keyed for exact lookup; registering a
    /// colliding key silently replaces the earlier entry, which lets tests
    /// redefine expectations between sub-tests. Argument lists with at least
    /// one fuzzy position are kept aside in registration order for the
    /// fuzzy scan.
    pub fn command(&mut self, name: &str, args: impl IntoIterator<Item = Arg>) -> CommandHandle {
        let args: Vec<Arg> = args.into_iter().collect();
        let handle = CommandHandle::new();
        if args.iter().any(Arg::is_fuzzy) {
            self.fuzzy.push(FuzzyRegistration {
                command: generate_key(name, &[]),
                args,
                slot: Rc::clone(&handle.slot),
            });
        } else {
            let literals: Vec<Value> = args
                .iter()
                .filter_map(|arg| arg.as_literal().cloned())
                .collect();
            self.exact
                .insert(generate_key(name, &literals), Rc::clone(&handle.slot));
        }
        handle
    }

    /// Register a command-name-only fallback, consulted when no
    /// argument-bearing registration matches an invocation of that command.
    pub fn generic_command(&mut self, name: &str) -> CommandHandle {
        self.command(name, std::iter::empty())
    }

    /// Resolve an invocation against the table.
    ///
    /// Lookup order: exact key, then the command-name-only generic key, then
    /// a forward scan of fuzzy registrations sharing the command name and
    /// arity, in registration order with the first match winning. A miss on
    /// all three is
    /// reported as `UnregisteredCommand`, never coerced to a default reply.
    pub fn resolve(&self, name: &str, args: &[Value]) -> Result<Resolved, ResolveError> {
        if let Some(slot) = self.exact.get(&generate_key(name, args)) {
            return Ok(outcome(slot));
        }
        let command = generate_key(name, &[]);
        if let Some(slot) = self.exact.get(&command) {
            return Ok(outcome(slot));
        }
        for registration in &self.fuzzy {
            if registration.command == command && args_match(&registration.args, args) {
                return Ok(outcome(&registration.slot));
            }
        }
        // The generic key carries no argument tokens, so it is always the
        // trimmed, uppercased command name and valid UTF-8.
        Err(ResolveError::UnregisteredCommand {
            command: String::from_utf8_lossy(&command).into_owned(),
            args_preview: preview_args(args),
        })
    }
}

fn outcome(slot: &Rc<RefCell<Expectation>>) -> Resolved {
    let expectation = slot.borrow();
    match &expectation.error {
        Some(message) => Resolved::Error(message.clone()),
        None => Resolved::Response(expectation.response.clone().unwrap_or(Reply::Nil)),
    }
}

fn preview_args(args: &[Value]) -> Option<String> {
    if args.is_empty() {
        return None;
    }
    let tokens: Vec<String> = args
        .iter()
        .map(|arg| String::from_utf8_lossy(&normalize_token(arg)).into_owned())
        .collect();
    Some(tokens.join(" "))
}

#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use rm_protocol::Value;

/// Build the canonical lookup key for a command invocation.
///
/// The command name is trimmed and ASCII-uppercased; each argument is
/// normalized with [`normalize_token`] and appended after a single space.
/// Two invocations that are semantically equal (`"foo"` vs `b"foo"`,
/// padded vs unpadded) produce the identical key. Keys are byte vectors,
/// not text, so binary arguments stay distinguishable.
#[must_use]
pub fn generate_key(command: &str, args: &[Value]) -> Vec<u8> {
    let mut key = command.trim().to_ascii_uppercase().into_bytes();
    for arg in args {
        key.push(b' ');
        key.extend_from_slice(&normalize_token(arg));
    }
    key
}

/// Canonical bytes for one argument value, shared by key generation and the
/// literal comparisons of the fuzzy scan.
///
/// Strings and byte sequences are trimmed and kept verbatim (byte sequences
/// that are not valid UTF-8 are preserved byte-for-byte, trimmed of ASCII
/// whitespace only), integers render in decimal, floats use the shortest
/// round-trippable decimal form, booleans render as `1`/`0`, and `Nil` is
/// the empty token.
#[must_use]
pub fn normalize_token(value: &Value) -> Vec<u8> {
    match value {
        Value::Str(text) => text.trim().as_bytes().to_vec(),
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.trim().as_bytes().to_vec(),
            Err(_) => bytes.trim_ascii().to_vec(),
        },
        Value::Int(n) => n.to_string().into_bytes(),
        Value::Float(x) => x.to_string().into_bytes(),
        Value::Bool(true) => b"1".to_vec(),
        Value::Bool(false) => b"0".to_vec(),
        Value::Nil => Vec::new(),
    }
}

/// A predicate over argument values: one registration position can accept a
/// whole class of values instead of a single literal.
pub trait FuzzyMatcher {
    fn matches(&self, value: &Value) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct AnyInt;

impl FuzzyMatcher for AnyInt {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::Int(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct AnyDouble;

impl FuzzyMatcher for AnyDouble {
    fn matches(&self, value: &Value) -> bool {
        matches!(value, Value::Float(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct AnyData;

impl FuzzyMatcher for AnyData {
    fn matches(&self, _value: &Value) -> bool {
        true
    }
}

/// Matches any integer argument. All integer widths convert into
/// `Value::Int`, so this covers signed and unsigned alike.
#[must_use]
pub fn any_int() -> Arg {
    Arg::Fuzzy(Rc::new(AnyInt))
}

/// Matches any floating-point argument (`f32` converts into `Value::Float`).
#[must_use]
pub fn any_double() -> Arg {
    Arg::Fuzzy(Rc::new(AnyDouble))
}

/// Matches any argument value at all.
#[must_use]
pub fn any_data() -> Arg {
    Arg::Fuzzy(Rc::new(AnyData))
}

/// One registered argument position: either a literal compared under the
/// same normalization as key tokens, or a fuzzy capability.
///
/// Whether a position is fuzzy is decided here, at registration
/// construction, so nothing downstream ever has to probe an opaque value
/// for matcher capabilities.
#[derive(Clone)]
pub enum Arg {
    Literal(Value),
    Fuzzy(Rc<dyn FuzzyMatcher>),
}

impl Arg {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Wrap a user-supplied matcher for use as a registration argument.
    pub fn fuzzy(matcher: impl FuzzyMatcher + 'static) -> Self {
        Self::Fuzzy(Rc::new(matcher))
    }

    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Fuzzy(_) => None,
        }
    }

    #[must_use]
    pub fn is_fuzzy(&self) -> bool {
        matches!(self, Self::Fuzzy(_))
    }

    /// Whether this position accepts the actual value of an invocation.
    #[must_use]
    pub fn accepts(&self, actual: &Value) -> bool {
        match self {
            Self::Literal(expected) => normalize_token(expected) == normalize_token(actual),
            Self::Fuzzy(matcher) => matcher.matches(actual),
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Fuzzy(_) => f.write_str("Fuzzy(..)"),
        }
    }
}

/// True when every position of a registered argument list accepts the
/// corresponding actual value. Arity must match exactly; there are no
/// partial or prefix matches.
#[must_use]
pub fn args_match(registered: &[Arg], actual: &[Value]) -> bool {
    registered.len() == actual.len()
        && registered
            .iter()
            .zip(actual)
            .all(|(arg, value)| arg.accepts(value))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Arg, any_data, any_double, any_int, args_match, generate_key, normalize_token};
    use rm_protocol::Value;

    #[test]
    fn command_name_is_trimmed_and_uppercased() {
        assert_eq!(generate_key("  get ", &[]), b"GET".to_vec());
        assert_eq!(
            generate_key("set", &[Value::from("k"), Value::from("v")]),
            b"SET k v".to_vec()
        );
    }

    #[test]
    fn string_and_byte_arguments_share_a_token() {
        let text = generate_key("SET", &[Value::from("a")]);
        let bytes = generate_key("SET", &[Value::from(b"a".as_slice())]);
        assert_eq!(text, bytes);
    }

    #[test]
    fn scalar_tokens_render_canonically() {
        assert_eq!(normalize_token(&Value::Int(-42)), b"-42".to_vec());
        assert_eq!(normalize_token(&Value::Float(2.5)), b"2.5".to_vec());
        assert_eq!(normalize_token(&Value::Bool(true)), b"1".to_vec());
        assert_eq!(normalize_token(&Value::Bool(false)), b"0".to_vec());
        assert_eq!(normalize_token(&Value::Nil), Vec::<u8>::new());
    }

    #[test]
    fn nil_argument_still_occupies_a_position() {
        assert_eq!(generate_key("DEL", &[Value::Nil]), b"DEL ".to_vec());
        assert_ne!(generate_key("DEL", &[Value::Nil]), generate_key("DEL", &[]));
    }

    #[test]
    fn invalid_utf8_byte_arguments_keep_distinct_keys() {
        let ff = generate_key("SET", &[Value::Bytes(vec![0xFF])]);
        let fe = generate_key("SET", &[Value::Bytes(vec![0xFE])]);
        assert_ne!(ff, fe);
        assert_eq!(ff, b"SET \xFF".to_vec());
        assert_eq!(
            normalize_token(&Value::Bytes(vec![b' ', 0xFF, 0x00, b'\t'])),
            vec![0xFF, 0x00]
        );
    }

    #[test]
    fn whitespace_padding_does_not_change_the_key() {
        assert_eq!(
            generate_key("GET", &[Value::from("  x  ")]),
            generate_key("GET", &[Value::from("x")])
        );
    }

    #[test]
    fn any_int_accepts_integers_only() {
        let matcher = any_int();
        assert!(matcher.accepts(&Value::Int(42)));
        assert!(matcher.accepts(&Value::from(42_u64)));
        assert!(!matcher.accepts(&Value::Float(42.0)));
        assert!(!matcher.accepts(&Value::from("42")));
        assert!(!matcher.accepts(&Value::Nil));
    }

    #[test]
    fn any_double_accepts_floats_only() {
        let matcher = any_double();
        assert!(matcher.accepts(&Value::Float(0.5)));
        assert!(!matcher.accepts(&Value::Int(1)));
    }

    #[test]
    fn any_data_accepts_everything() {
        let matcher = any_data();
        assert!(matcher.accepts(&Value::Nil));
        assert!(matcher.accepts(&Value::from("anything")));
        assert!(matcher.accepts(&Value::Bool(false)));
    }

    #[test]
    fn literal_positions_compare_under_token_normalization() {
        let registered = [Arg::literal(" key "), any_int()];
        assert!(args_match(&registered, &[Value::from("key"), Value::Int(7)]));
        assert!(!args_match(
            &registered,
            &[Value::from("key"), Value::from("abc")]
        ));
    }

    #[test]
    fn arity_mismatch_never_matches() {
        let registered = [Arg::literal("key"), any_data()];
        assert!(!args_match(&registered, &[Value::from("key")]));
        assert!(!args_match(
            &registered,
            &[Value::from("key"), Value::Nil, Value::Nil]
        ));
    }

    #[test]
    fn custom_matchers_plug_in() {
        struct NonEmptyText;
        impl super::FuzzyMatcher for NonEmptyText {
            fn matches(&self, value: &Value) -> bool {
                matches!(value, Value::Str(text) if !text.is_empty())
            }
        }

        let registered = [Arg::fuzzy(NonEmptyText)];
        assert!(args_match(&registered, &[Value::from("hello")]));
        assert!(!args_match(&registered, &[Value::from("")]));
        assert!(!args_match(&registered, &[Value::Int(1)]));
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[a-z]{0,8}".prop_map(Value::Str),
            proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            any::<bool>().prop_map(Value::Bool),
            Just(Value::Nil),
        ]
    }

    proptest! {
        #[test]
        fn key_generation_is_deterministic(
            command in "[a-zA-Z]{1,12}",
            args in proptest::collection::vec(value_strategy(), 0..4),
        ) {
            prop_assert_eq!(generate_key(&command, &args), generate_key(&command, &args));
        }

        #[test]
        fn key_ignores_command_case_and_padding(
            command in "[a-zA-Z]{1,12}",
            args in proptest::collection::vec(value_strategy(), 0..4),
        ) {
            let padded = format!("  {}  ", command.to_lowercase());
            prop_assert_eq!(
                generate_key(&padded, &args),
                generate_key(&command.to_uppercase(), &args)
            );
        }

        #[test]
        fn generic_key_is_a_strict_prefix_of_argument_keys(
            command in "[a-zA-Z]{1,12}",
            args in proptest::collection::vec(value_strategy(), 1..4),
        ) {
            let generic = generate_key(&command, &[]);
            let full = generate_key(&command, &args);
            prop_assert!(full.len() > generic.len());
            prop_assert!(full.starts_with(&generic));
        }
    }
}

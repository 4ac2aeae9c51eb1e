//! Anonymization expression evaluator.
//!
//! A rewrite rule whose text starts with `faker` is evaluated locally for
//! every row, e.g. `faker.Person().Name()` or `faker.IntBetween(1, 100)`.
//! Each evaluation parses the text again and draws from a fresh thread RNG,
//! so identical expressions produce independent values.
//!
//! # Module Structure
//! - `parser`: expression grammar and argument splitting
//! - `registry`: capability registry of root methods and namespaces

pub mod parser;
pub mod registry;


use parser::{Expression, FAKER_PREFIX};
use rand::RngCore;
use registry::Registry;
use thiserror::Error;

/// Failure to parse or evaluate one anonymization expression.
///
/// These errors are local to a single value; the dump engine falls back to
/// the original text and never aborts because of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FakerError {
    #[error("expression does not start with 'faker': {0}")]
    MissingPrefix(String),

    #[error("expression names no faker call: {0}")]
    MissingCall(String),

    #[error("empty call name at position {position}")]
    EmptyName { position: usize },

    #[error("invalid call name '{0}'")]
    InvalidName(String),

    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { found: char, position: usize },

    #[error("unbalanced parentheses in call '{name}'")]
    UnbalancedParentheses { name: String },

    #[error("unterminated quote in arguments of '{name}'")]
    UnbalancedQuotes { name: String },

    #[error("unexpected trailing input '{0}'")]
    TrailingInput(String),

    #[error("at most two chained calls are supported: {0}")]
    TooManyCalls(String),

    #[error("faker call '{0}' is not allowed")]
    Denied(String),

    #[error("unknown faker namespace '{0}'")]
    UnknownNamespace(String),

    #[error("unknown faker method '{0}'")]
    UnknownMethod(String),

    #[error("faker namespace '{0}' requires a method call")]
    MissingMethod(String),

    #[error("'{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of '{name}' is not a valid {kind}: '{value}'")]
    InvalidArgument {
        name: String,
        index: usize,
        kind: String,
        value: String,
    },
}

/// A generated value.
#[derive(Debug, Clone, PartialEq)]
pub enum FakerValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Rendered space-separated
    List(Vec<String>),
}

impl std::fmt::Display for FakerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FakerValue::Text(v) => f.write_str(v),
            FakerValue::Int(v) => write!(f, "{}", v),
            FakerValue::Float(v) => write!(f, "{}", v),
            FakerValue::Bool(v) => write!(f, "{}", v),
            FakerValue::List(v) => f.write_str(&v.join(" ")),
        }
    }
}

/// Evaluates anonymization expressions.
///
/// # Example
/// ```rust
/// use anondump_core::FakerService;
///
/// let service = FakerService::new();
/// let digit = service.replace_when_requested("faker.RandomDigit()").unwrap();
/// assert_eq!(digit.len(), 1);
///
/// // Anything that does not start with `faker` passes through untouched.
/// assert_eq!(service.replace_when_requested("plain").unwrap(), "plain");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FakerService {
    registry: &'static Registry,
}

impl Default for FakerService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakerService {
    /// Creates a service backed by the global registry.
    pub fn new() -> Self {
        Self {
            registry: Registry::global(),
        }
    }

    /// Returns true if the text should go through the evaluator.
    pub fn is_expression(text: &str) -> bool {
        text.starts_with(FAKER_PREFIX)
    }

    /// Replaces `text` with a generated value when it is a faker expression.
    ///
    /// # Errors
    /// Returns a `FakerError` if the expression is malformed, unknown, or its
    /// arguments do not fit the method.
    pub fn replace_when_requested(&self, text: &str) -> Result<String, FakerError> {
        if !Self::is_expression(text) {
            return Ok(text.to_string());
        }
        let mut rng = rand::rng();
        self.evaluate_with_rng(text, &mut rng)
    }

    /// Evaluates an expression with the given RNG.
    ///
    /// # Errors
    /// See [`FakerService::replace_when_requested`].
    pub fn evaluate_with_rng(
        &self,
        text: &str,
        rng: &mut dyn RngCore,
    ) -> Result<String, FakerError> {
        let expr = parser::parse(text)?;
        let value = self.registry.resolve(&expr)?.run(rng)?;
        Ok(value.to_string())
    }

    /// Checks that an expression parses and resolves without generating a value.
    ///
    /// # Errors
    /// Returns the same error evaluation would.
    pub fn validate(&self, text: &str) -> Result<Expression, FakerError> {
        let expr = parser::parse(text)?;
        self.registry.resolve(&expr)?;
        Ok(expr)
    }
}

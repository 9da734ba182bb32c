//! Error types for BaseModel Rust.
//!
//! Two families live here:
//!
//! - **Data errors**: an [`ErrorCause`] wrapped with a location path in an
//!   [`ErrorWrapper`], aggregated into one [`ValidationError`] per
//!   validation pass.
//! - **Usage errors**: [`ConfigError`] for defects in a model definition,
//!   plus the guarded-mutation and encoding failures. These are never mixed
//!   into a data-validation aggregate.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

use crate::config::Config;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One step of a location path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum LocItem {
    /// Mapping key, field alias or field name.
    Key(String),
    /// Position in a sequence.
    Index(usize),
}

impl fmt::Display for LocItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocItem::Key(key) => f.write_str(key),
            LocItem::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for LocItem {
    fn from(key: &str) -> Self {
        LocItem::Key(key.to_string())
    }
}

impl From<String> for LocItem {
    fn from(key: String) -> Self {
        LocItem::Key(key)
    }
}

impl From<usize> for LocItem {
    fn from(index: usize) -> Self {
        LocItem::Index(index)
    }
}

/// A location path, outermost step first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Loc(Vec<LocItem>);

impl Loc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend this path by one step.
    pub fn child(&self, item: impl Into<LocItem>) -> Self {
        let mut items = self.0.clone();
        items.push(item.into());
        Loc(items)
    }

    /// Concatenate two paths.
    pub fn join(&self, tail: &Loc) -> Self {
        let mut items = self.0.clone();
        items.extend(tail.0.iter().cloned());
        Loc(items)
    }

    pub fn items(&self) -> &[LocItem] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

impl From<&str> for Loc {
    fn from(key: &str) -> Self {
        Loc(vec![LocItem::from(key)])
    }
}

impl From<String> for Loc {
    fn from(key: String) -> Self {
        Loc(vec![LocItem::Key(key)])
    }
}

impl From<Vec<LocItem>> for Loc {
    fn from(items: Vec<LocItem>) -> Self {
        Loc(items)
    }
}

/// Why a value failed at one location.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCause {
    /// Required field absent after defaulting.
    Missing,
    /// Unconsumed input key under the `forbid` extra policy.
    Extra,
    /// `null` given for a field that does not accept it.
    NoneNotAllowed,
    /// Value could not be coerced to a builtin type (`integer`, `str`, ...).
    WrongType { expected: &'static str },
    /// Value is not an instance of the declared arbitrary type.
    ArbitraryType { expected: String },
    /// Fixed-length tuple received the wrong number of items.
    TupleLength { expected: usize, actual: usize },
    /// String shorter than the configured minimum.
    StrMinLength { limit: usize },
    /// String longer than the configured maximum.
    StrMaxLength { limit: usize },
    /// String does not match the constraint pattern.
    StrRegex { pattern: String },
    NumberNotGt { limit: f64 },
    NumberNotGe { limit: f64 },
    NumberNotLt { limit: f64 },
    NumberNotLe { limit: f64 },
    /// Model input was not a mapping.
    NotAMapping { model: String, found: String },
    /// Raw bytes/string could not be decoded.
    Decode { message: String },
    /// Value rejected by a validator with a free-form message.
    Value(String),
    /// Value of the wrong kind, reported by a validator.
    Type(String),
    /// A validator assertion failed.
    Assertion(String),
    /// Errors from validating a nested model.
    Nested(ValidationError),
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl ErrorCause {
    /// Shorthand for [`ErrorCause::Value`].
    pub fn value(message: impl Into<String>) -> Self {
        ErrorCause::Value(message.into())
    }

    /// Shorthand for [`ErrorCause::Type`].
    pub fn type_error(message: impl Into<String>) -> Self {
        ErrorCause::Type(message.into())
    }

    /// Shorthand for [`ErrorCause::Assertion`].
    pub fn assertion(message: impl Into<String>) -> Self {
        ErrorCause::Assertion(message.into())
    }

    /// Dotted error code, e.g. `value_error.missing`.
    pub fn code(&self) -> Cow<'static, str> {
        match self {
            ErrorCause::Missing => "value_error.missing".into(),
            ErrorCause::Extra => "value_error.extra".into(),
            ErrorCause::NoneNotAllowed => "type_error.none.not_allowed".into(),
            ErrorCause::WrongType { expected } => format!("type_error.{expected}").into(),
            ErrorCause::ArbitraryType { .. } => "type_error.arbitrary_type".into(),
            ErrorCause::TupleLength { .. } => "value_error.tuple.length".into(),
            ErrorCause::StrMinLength { .. } => "value_error.any_str.min_length".into(),
            ErrorCause::StrMaxLength { .. } => "value_error.any_str.max_length".into(),
            ErrorCause::StrRegex { .. } => "value_error.str.regex".into(),
            ErrorCause::NumberNotGt { .. } => "value_error.number.not_gt".into(),
            ErrorCause::NumberNotGe { .. } => "value_error.number.not_ge".into(),
            ErrorCause::NumberNotLt { .. } => "value_error.number.not_lt".into(),
            ErrorCause::NumberNotLe { .. } => "value_error.number.not_le".into(),
            ErrorCause::NotAMapping { .. } | ErrorCause::Type(_) => "type_error".into(),
            ErrorCause::Decode { .. } => "value_error.decode".into(),
            ErrorCause::Value(_) => "value_error".into(),
            ErrorCause::Assertion(_) => "assertion_error".into(),
            ErrorCause::Nested(_) => "value_error.nested".into(),
        }
    }

    /// Placeholder values available to message templates.
    pub fn context(&self) -> Vec<(&'static str, String)> {
        match self {
            ErrorCause::WrongType { expected } => vec![("expected", (*expected).to_string())],
            ErrorCause::ArbitraryType { expected } => {
                vec![("expected_arbitrary_type", expected.clone())]
            }
            ErrorCause::TupleLength { expected, actual } => vec![
                ("expected_length", expected.to_string()),
                ("actual_length", actual.to_string()),
            ],
            ErrorCause::StrMinLength { limit } | ErrorCause::StrMaxLength { limit } => {
                vec![("limit_value", limit.to_string())]
            }
            ErrorCause::StrRegex { pattern } => vec![("pattern", pattern.clone())],
            ErrorCause::NumberNotGt { limit }
            | ErrorCause::NumberNotGe { limit }
            | ErrorCause::NumberNotLt { limit }
            | ErrorCause::NumberNotLe { limit } => vec![("limit_value", format_number(*limit))],
            ErrorCause::NotAMapping { model, found } => {
                vec![("model", model.clone()), ("found", found.clone())]
            }
            ErrorCause::Decode { message }
            | ErrorCause::Value(message)
            | ErrorCause::Type(message)
            | ErrorCause::Assertion(message) => vec![("message", message.clone())],
            ErrorCause::Missing
            | ErrorCause::Extra
            | ErrorCause::NoneNotAllowed
            | ErrorCause::Nested(_) => Vec::new(),
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            ErrorCause::Missing => "field required",
            ErrorCause::Extra => "extra fields not permitted",
            ErrorCause::NoneNotAllowed => "none is not an allowed value",
            ErrorCause::WrongType { .. } => "value is not a valid {expected}",
            ErrorCause::ArbitraryType { .. } => "instance of {expected_arbitrary_type} expected",
            ErrorCause::TupleLength { .. } => {
                "wrong tuple length {actual_length}, expected {expected_length}"
            }
            ErrorCause::StrMinLength { .. } => {
                "ensure this value has at least {limit_value} characters"
            }
            ErrorCause::StrMaxLength { .. } => {
                "ensure this value has at most {limit_value} characters"
            }
            ErrorCause::StrRegex { .. } => "string does not match regex \"{pattern}\"",
            ErrorCause::NumberNotGt { .. } => "ensure this value is greater than {limit_value}",
            ErrorCause::NumberNotGe { .. } => {
                "ensure this value is greater than or equal to {limit_value}"
            }
            ErrorCause::NumberNotLt { .. } => "ensure this value is less than {limit_value}",
            ErrorCause::NumberNotLe { .. } => {
                "ensure this value is less than or equal to {limit_value}"
            }
            ErrorCause::NotAMapping { .. } => "{model} expected dict not {found}",
            ErrorCause::Decode { .. }
            | ErrorCause::Value(_)
            | ErrorCause::Type(_)
            | ErrorCause::Assertion(_) => "{message}",
            ErrorCause::Nested(_) => "invalid nested model",
        }
    }

    /// Render the message, optionally through an override template.
    pub fn message(&self, template: Option<&str>) -> String {
        let mut out = template.unwrap_or(self.default_template()).to_string();
        for (key, value) in self.context() {
            out = out.replace(&format!("{{{key}}}"), &value);
        }
        out
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message(None))
    }
}

/// An [`ErrorCause`] bound to the location where it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorWrapper {
    cause: ErrorCause,
    loc: Loc,
    msg_template: Option<String>,
}

impl ErrorWrapper {
    pub fn new(cause: ErrorCause, loc: impl Into<Loc>) -> Self {
        Self {
            cause,
            loc: loc.into(),
            msg_template: None,
        }
    }

    /// Pick up a message override from the model's `error_msg_templates`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.msg_template = config.error_msg_template(&self.cause.code()).map(str::to_string);
        self
    }

    pub fn cause(&self) -> &ErrorCause {
        &self.cause
    }

    pub fn loc(&self) -> &Loc {
        &self.loc
    }

    pub fn message(&self) -> String {
        self.cause.message(self.msg_template.as_deref())
    }
}

/// One flattened error record, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub loc: Loc,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Every failure found in one validation pass, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    raw_errors: Vec<ErrorWrapper>,
}

impl ValidationError {
    pub fn new(raw_errors: Vec<ErrorWrapper>) -> Self {
        Self { raw_errors }
    }

    /// Aggregate wrappers; `None` iff there is nothing to report.
    pub fn aggregate(raw_errors: Vec<ErrorWrapper>) -> Option<Self> {
        if raw_errors.is_empty() {
            None
        } else {
            Some(Self::new(raw_errors))
        }
    }

    pub fn raw_errors(&self) -> &[ErrorWrapper] {
        &self.raw_errors
    }

    /// Flatten nested model errors into location-qualified records.
    pub fn errors(&self) -> Vec<ErrorDetail> {
        let mut out = Vec::new();
        self.flatten_into(&Loc::new(), &mut out);
        out
    }

    fn flatten_into(&self, prefix: &Loc, out: &mut Vec<ErrorDetail>) {
        for wrapper in &self.raw_errors {
            let loc = prefix.join(wrapper.loc());
            match wrapper.cause() {
                ErrorCause::Nested(inner) => inner.flatten_into(&loc, out),
                cause => out.push(ErrorDetail {
                    loc,
                    msg: wrapper.message(),
                    kind: cause.code().into_owned(),
                }),
            }
        }
    }

    /// Pretty JSON array of the flattened errors.
    pub fn json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.errors())
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors();
        let count = errors.len();
        write!(
            f,
            "{} validation error{}",
            count,
            if count == 1 { "" } else { "s" }
        )?;
        for error in &errors {
            write!(f, "\n{}\n  {} (type={})", error.loc, error.msg, error.kind)?;
        }
        Ok(())
    }
}

impl StdError for ValidationError {}

/// A defect in a model definition or its use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ConfigError {}

/// A value the serializer and its encoder could not represent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeError {
    type_name: String,
}

impl EncodeError {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object of type '{}' is not JSON serializable", self.type_name)
    }
}

impl StdError for EncodeError {}

/// The crate-level error.
#[derive(Debug)]
pub enum Error {
    /// Model definition or usage defect.
    Config(ConfigError),
    /// Aggregated data-validation failure.
    Validation(ValidationError),
    /// Read of a value that is not stored on the instance.
    UnknownField { model: String, name: String },
    /// Assignment to a name that is not a declared field.
    NoSuchField { model: String, name: String },
    /// Assignment on a model whose config disables mutation.
    Immutable { model: String },
    /// Serialization failure.
    Encode(EncodeError),
    /// I/O failure while reading input.
    Io(std::io::Error),
}

impl Error {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Error::Config(err) => Some(err),
            _ => None,
        }
    }

    pub const fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "configuration error: {err}"),
            Error::Validation(err) => write!(f, "{err}"),
            Error::UnknownField { model, name } => {
                write!(f, "'{model}' object has no attribute '{name}'")
            }
            Error::NoSuchField { model, name } => {
                write!(f, "\"{model}\" object has no field \"{name}\"")
            }
            Error::Immutable { model } => write!(
                f,
                "\"{model}\" is immutable and does not support item assignment"
            ),
            Error::Encode(err) => write!(f, "{err}"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Validation(err) => Some(err),
            Error::Encode(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::UnknownField { .. } | Error::NoSuchField { .. } | Error::Immutable { .. } => {
                None
            }
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Self {
        Error::Encode(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

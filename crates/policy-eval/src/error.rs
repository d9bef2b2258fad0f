//! Compile-time error types.
//!
//! Evaluation itself is total: once an evaluator tree is built, running it
//! against an event cannot fail. Every variant here is raised while the tree
//! is being assembled and aborts that expression.

use thiserror::Error;

use crate::value::FieldValueType;

/// Errors that can occur while compiling matchers or assembling operators.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A regular expression failed to compile.
    #[error("invalid regexp `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A glob pattern is malformed.
    #[error("invalid glob `{pattern}`: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    /// A segmented pattern is malformed (e.g. contains `**`).
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A non-string literal was handed to a string value set.
    #[error("invalid field value `{0}`")]
    InvalidFieldValue(String),

    /// A CIDR literal failed to parse.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(#[from] ipnet::AddrParseError),

    /// An IP literal failed to parse.
    #[error("invalid IP: {0}")]
    InvalidIp(#[from] std::net::AddrParseError),

    /// A literal of one kind was registered against a field that was already
    /// compared against literals of another kind.
    #[error("field `{field}` expects {expected} values, got {actual}")]
    FieldValueType {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// No string matcher exists for this value type.
    #[error("unknown type: {0:?}")]
    UnknownMatcherKind(FieldValueType),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EvalError>;

//! Literal values, their type tags and string comparison options.

use std::fmt;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// How a literal should be interpreted when compared against a field.
///
/// The tag is chosen by the parser from the literal's syntax; it is never
/// inferred from the pattern text here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValueType {
    /// Plain value compared by equality.
    #[default]
    Scalar,
    /// Path-aware glob (`*`, `?`, `**`).
    Glob,
    /// Star-segmented pattern (`*` only).
    Pattern,
    /// Regular expression.
    Regexp,
    /// Network range.
    IpNet,
}

/// A concrete literal taken from a rule expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Cidr(IpNet),
}

impl LiteralValue {
    /// Short type name used in error messages and for registry type checks.
    pub fn kind(&self) -> &'static str {
        match self {
            LiteralValue::Bool(_) => "bool",
            LiteralValue::Int(_) => "int",
            LiteralValue::Str(_) => "string",
            LiteralValue::Cidr(_) => "cidr",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Bool(b) => write!(f, "{b}"),
            LiteralValue::Int(i) => write!(f, "{i}"),
            LiteralValue::Str(s) => f.write_str(s),
            LiteralValue::Cidr(n) => write!(f, "{n}"),
        }
    }
}

impl From<bool> for LiteralValue {
    fn from(v: bool) -> Self {
        LiteralValue::Bool(v)
    }
}

impl From<i64> for LiteralValue {
    fn from(v: i64) -> Self {
        LiteralValue::Int(v)
    }
}

impl From<&str> for LiteralValue {
    fn from(v: &str) -> Self {
        LiteralValue::Str(v.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(v: String) -> Self {
        LiteralValue::Str(v)
    }
}

impl From<IpNet> for LiteralValue {
    fn from(v: IpNet) -> Self {
        LiteralValue::Cidr(v)
    }
}

/// A literal together with its interpretation tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldValue {
    pub value: LiteralValue,
    pub value_type: FieldValueType,
}

impl FieldValue {
    pub fn new(value: impl Into<LiteralValue>, value_type: FieldValueType) -> Self {
        FieldValue {
            value: value.into(),
            value_type,
        }
    }

    pub fn scalar(value: impl Into<LiteralValue>) -> Self {
        Self::new(value, FieldValueType::Scalar)
    }
}

/// Options applied when comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StringCmpOpts {
    /// Compare with Unicode case folding.
    pub case_insensitive: bool,
    /// Treat `\` as `/` on both sides (glob matching only).
    pub path_separator_normalize: bool,
}

impl StringCmpOpts {
    pub fn is_default(&self) -> bool {
        *self == StringCmpOpts::default()
    }
}

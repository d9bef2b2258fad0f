//! Compiled string matchers and string value sets.
//!
//! Each `StringMatcher` variant is built once, when the expression is
//! compiled, and then only read. `StringValues` gathers the literals an `in`
//! style comparison tests against and splits them into a scalar fast path and
//! a list of matchers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{EvalError, Result};
use crate::evaluator::{PATTERN_WEIGHT, REGEXP_WEIGHT};
use crate::glob::Glob;
use crate::pattern::PatternElement;
use crate::value::{FieldValue, FieldValueType, LiteralValue, StringCmpOpts};

/// `(a|b|c)`, optionally wrapped in `.*`, made only of plain word characters.
static ALTERNATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\.\*)?\(([a-zA-Z_|]+)\)(?:\.\*)?$").expect("alternation regex is valid")
});

// =============================================================================
// Matchers
// =============================================================================

/// A pre-compiled string predicate.
#[derive(Debug, Clone)]
pub enum StringMatcher {
    Scalar(ScalarStringMatcher),
    Glob(GlobStringMatcher),
    Regexp(RegexpStringMatcher),
    Pattern(PatternStringMatcher),
}

impl StringMatcher {
    /// Build the matcher selected by `kind` for `pattern`.
    pub fn new(kind: FieldValueType, pattern: &str, opts: StringCmpOpts) -> Result<Self> {
        match kind {
            FieldValueType::Scalar => Ok(StringMatcher::Scalar(ScalarStringMatcher::new(
                pattern,
                opts.case_insensitive,
            ))),
            FieldValueType::Glob => Ok(StringMatcher::Glob(GlobStringMatcher::new(
                pattern,
                opts.case_insensitive,
                opts.path_separator_normalize,
            )?)),
            FieldValueType::Regexp => Ok(StringMatcher::Regexp(RegexpStringMatcher::new(
                pattern,
                opts.case_insensitive,
            )?)),
            FieldValueType::Pattern => Ok(StringMatcher::Pattern(PatternStringMatcher::new(
                pattern,
                opts.case_insensitive,
            )?)),
            FieldValueType::IpNet => Err(EvalError::UnknownMatcherKind(kind)),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            StringMatcher::Scalar(m) => m.matches(value),
            StringMatcher::Glob(m) => m.matches(value),
            StringMatcher::Regexp(m) => m.matches(value),
            StringMatcher::Pattern(m) => m.matches(value),
        }
    }

    /// Evaluation cost added to a comparison that runs this matcher.
    pub fn weight(&self) -> usize {
        match self {
            StringMatcher::Scalar(_) => 0,
            StringMatcher::Glob(_) | StringMatcher::Pattern(_) => PATTERN_WEIGHT,
            StringMatcher::Regexp(_) => REGEXP_WEIGHT,
        }
    }
}

impl fmt::Display for StringMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StringMatcher::Scalar(m) => m.value.as_str(),
            StringMatcher::Glob(m) => m.glob.pattern(),
            StringMatcher::Regexp(m) => m.pattern.as_str(),
            StringMatcher::Pattern(m) => m.pattern.pattern(),
        };
        f.write_str(text)
    }
}

/// Exact or case-folded equality.
#[derive(Debug, Clone)]
pub struct ScalarStringMatcher {
    value: String,
    case_insensitive: bool,
}

impl ScalarStringMatcher {
    pub fn new(value: &str, case_insensitive: bool) -> Self {
        ScalarStringMatcher {
            value: value.to_string(),
            case_insensitive,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.case_insensitive {
            eq_fold(&self.value, value)
        } else {
            self.value == value
        }
    }
}

/// Glob matcher, see [`Glob`].
#[derive(Debug, Clone)]
pub struct GlobStringMatcher {
    glob: Glob,
}

impl GlobStringMatcher {
    pub fn new(pattern: &str, case_insensitive: bool, normalize_path: bool) -> Result<Self> {
        Ok(GlobStringMatcher {
            glob: Glob::new(pattern, case_insensitive, normalize_path)?,
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        self.glob.matches(value)
    }

    /// Whether `value` is a leading path of something this glob matches.
    pub fn contains(&self, value: &str) -> bool {
        self.glob.contains(value)
    }
}

#[derive(Debug, Clone)]
enum RegexpKind {
    /// Substring search over plain alternatives.
    Alternation(Vec<String>),
    Full(Regex),
}

/// Regular expression matcher (unanchored search).
#[derive(Debug, Clone)]
pub struct RegexpStringMatcher {
    pattern: String,
    kind: RegexpKind,
}

impl RegexpStringMatcher {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self> {
        if !case_insensitive
            && let Some(caps) = ALTERNATION_RE.captures(pattern)
        {
            let alternatives: Vec<String> = caps[1].split('|').map(str::to_string).collect();
            log::debug!(
                "regexp `{pattern}` compiled to {} substring alternatives",
                alternatives.len()
            );
            return Ok(RegexpStringMatcher {
                pattern: pattern.to_string(),
                kind: RegexpKind::Alternation(alternatives),
            });
        }

        let pattern = if case_insensitive && !pattern.starts_with("(?i)") {
            format!("(?i){pattern}")
        } else {
            pattern.to_string()
        };

        let re = Regex::new(&pattern).map_err(|source| EvalError::InvalidRegex {
            pattern: pattern.clone(),
            source,
        })?;

        Ok(RegexpStringMatcher {
            pattern,
            kind: RegexpKind::Full(re),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.kind {
            RegexpKind::Alternation(alternatives) => {
                alternatives.iter().any(|alt| value.contains(alt.as_str()))
            }
            RegexpKind::Full(re) => re.is_match(value),
        }
    }
}

/// Star-segmented pattern matcher, see [`PatternElement`].
#[derive(Debug, Clone)]
pub struct PatternStringMatcher {
    pattern: PatternElement,
}

impl PatternStringMatcher {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self> {
        Ok(PatternStringMatcher {
            pattern: PatternElement::new(pattern, case_insensitive)?,
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        self.pattern.matches(value)
    }
}

/// Unicode case-insensitive equality without allocating.
pub fn eq_fold(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}

// =============================================================================
// Value sets
// =============================================================================

/// The set of string literals a field is tested against.
///
/// Call [`StringValues::compile`] before [`StringValues::matches`]; until
/// then the set matches nothing.
#[derive(Debug, Clone, Default)]
pub struct StringValues {
    scalars: Vec<String>,
    string_matchers: Vec<StringMatcher>,
    field_values: Vec<FieldValue>,
}

impl StringValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw literals, in insertion order.
    pub fn field_values(&self) -> &[FieldValue] {
        &self.field_values
    }

    pub fn scalar_values(&self) -> &[String] {
        &self.scalars
    }

    pub fn string_matchers(&self) -> &[StringMatcher] {
        &self.string_matchers
    }

    /// Append a literal unless an equal one is already present.
    pub fn append_field_value(&mut self, value: FieldValue) {
        if !self.field_values.contains(&value) {
            self.field_values.push(value);
        }
    }

    pub fn append_scalar_value(&mut self, value: impl Into<String>) {
        self.append_field_value(FieldValue::scalar(value.into()));
    }

    /// Replace the literals and drop any previously compiled state.
    pub fn set_field_values(&mut self, values: impl IntoIterator<Item = FieldValue>) {
        self.field_values.clear();
        self.scalars.clear();
        self.string_matchers.clear();
        for value in values {
            self.append_field_value(value);
        }
    }

    /// Rebuild the scalar list and matchers from the raw literals.
    ///
    /// Scalars only take the fast path when `opts` is the default; any other
    /// option set turns every literal into a matcher.
    pub fn compile(&mut self, opts: StringCmpOpts) -> Result<()> {
        let mut scalars = Vec::new();
        let mut string_matchers = Vec::new();

        for value in &self.field_values {
            let LiteralValue::Str(s) = &value.value else {
                return Err(EvalError::InvalidFieldValue(value.value.to_string()));
            };

            if opts.is_default() && value.value_type == FieldValueType::Scalar {
                scalars.push(s.clone());
            } else {
                string_matchers.push(StringMatcher::new(value.value_type, s, opts)?);
            }
        }

        log::trace!(
            "compiled string values: {} scalars, {} matchers",
            scalars.len(),
            string_matchers.len()
        );
        self.scalars = scalars;
        self.string_matchers = string_matchers;
        Ok(())
    }

    /// Cost of the most expensive compiled matcher, zero for scalars only.
    pub fn weight(&self) -> usize {
        self.string_matchers
            .iter()
            .map(StringMatcher::weight)
            .max()
            .unwrap_or(0)
    }

    /// Test `value` against the set.
    ///
    /// Returns the matching literal, or the canonical text of the matching
    /// matcher, on success.
    pub fn matches(&self, value: &str) -> Option<String> {
        if let Some(s) = self.scalars.iter().find(|s| s.as_str() == value) {
            return Some(s.clone());
        }
        self.string_matchers
            .iter()
            .find(|m| m.matches(value))
            .map(|m| m.to_string())
    }
}

impl<S: Into<String>> FromIterator<S> for StringValues {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut values = StringValues::new();
        for s in iter {
            values.append_scalar_value(s);
        }
        values
    }
}

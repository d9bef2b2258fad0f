//! Path-aware glob matching.
//!
//! A glob is split on `/` into segments. Inside a segment `*` matches any run
//! of characters and `?` matches exactly one character, neither crossing a
//! separator. A segment made only of `**` matches any number of whole
//! segments, including none.
//!
//! Each glob is compiled once into a single anchored [`Regex`], so matching
//! an event value is linear in its length.

use regex::Regex;

use crate::error::{EvalError, Result};

const SEP: &str = "/";
const NOT_SEP: &str = "[^/]";
const SEP_NORMALIZED: &str = r"[/\\]";
const NOT_SEP_NORMALIZED: &str = r"[^/\\]";

enum Part {
    AnyPath,
    Tokens(String),
}

#[derive(Debug, Clone)]
enum Element {
    AnyPath,
    Segment(Regex),
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
    /// Per-segment matchers, only read by [`Glob::contains`].
    elements: Vec<Element>,
    normalize_path: bool,
}

impl Glob {
    /// Compile `pattern`.
    ///
    /// With `normalize_path`, `\` is read as `/` in both the pattern and the
    /// values it is matched against.
    pub fn new(pattern: &str, case_insensitive: bool, normalize_path: bool) -> Result<Self> {
        let source = if normalize_path {
            pattern.replace('\\', "/")
        } else {
            pattern.to_string()
        };
        let (sep, not_sep) = if normalize_path {
            (SEP_NORMALIZED, NOT_SEP_NORMALIZED)
        } else {
            (SEP, NOT_SEP)
        };

        let mut parts = Vec::new();
        for segment in source.split('/') {
            if segment == "**" {
                // consecutive `**` segments are equivalent to one
                if !matches!(parts.last(), Some(Part::AnyPath)) {
                    parts.push(Part::AnyPath);
                }
                continue;
            }
            if segment.contains("**") {
                return Err(EvalError::InvalidGlob {
                    pattern: pattern.to_string(),
                    reason: "`**` must be a whole path segment".into(),
                });
            }
            parts.push(Part::Tokens(segment_regex(segment, not_sep)));
        }

        let prefix = if case_insensitive { "(?i)^" } else { "^" };
        let mut full = String::from(prefix);
        if let [Part::AnyPath] = parts.as_slice() {
            full.push_str("(?s:.*)");
        } else {
            let mut leading_any = false;
            for (i, part) in parts.iter().enumerate() {
                match part {
                    Part::AnyPath if i == 0 => {
                        full.push_str(&format!("(?:{not_sep}*{sep})*"));
                        leading_any = true;
                    }
                    Part::AnyPath => full.push_str(&format!("(?:{sep}{not_sep}*)*")),
                    Part::Tokens(re) => {
                        if i > 0 && !leading_any {
                            full.push_str(sep);
                        }
                        leading_any = false;
                        full.push_str(re);
                    }
                }
            }
        }
        full.push('$');

        let elements = parts
            .iter()
            .map(|part| match part {
                Part::AnyPath => Ok(Element::AnyPath),
                Part::Tokens(re) => compile(pattern, &format!("{prefix}{re}$")).map(Element::Segment),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Glob {
            pattern: pattern.to_string(),
            regex: compile(pattern, &full)?,
            elements,
            normalize_path,
        })
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the whole of `value` matches the glob.
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// Whether `value`, read as a directory path, is a prefix of some path
    /// this glob matches. The root `/` is a prefix of every absolute glob.
    pub fn contains(&self, value: &str) -> bool {
        let value = if self.normalize_path {
            value.replace('\\', "/")
        } else {
            value.to_string()
        };
        let trimmed = value.strip_suffix('/').unwrap_or(&value);
        let segments: Vec<&str> = trimmed.split('/').collect();
        match_prefix(&self.elements, &segments)
    }
}

fn compile(pattern: &str, re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|source| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Regex source for one segment, without anchors.
fn segment_regex(segment: &str, not_sep: &str) -> String {
    let mut re = String::new();
    let mut literal = String::new();
    for c in segment.chars() {
        match c {
            '*' | '?' => {
                if !literal.is_empty() {
                    re.push_str(&regex::escape(&std::mem::take(&mut literal)));
                }
                re.push_str(not_sep);
                if c == '*' {
                    re.push('*');
                }
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        re.push_str(&regex::escape(&literal));
    }
    re
}

fn match_prefix(elements: &[Element], segments: &[&str]) -> bool {
    let Some((head, tail)) = segments.split_first() else {
        return true;
    };
    match elements.split_first() {
        None => false,
        Some((Element::AnyPath, _)) => true,
        Some((Element::Segment(re), rest)) => re.is_match(head) && match_prefix(rest, tail),
    }
}

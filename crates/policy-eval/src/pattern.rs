//! Star-segmented patterns.
//!
//! A pattern is cut on `*` into literal segments. The first segment anchors
//! the start of the value, the last one anchors the end, and the ones in
//! between must appear in order. Unlike globs, `*` here also spans `/`.

use crate::error::{EvalError, Result};

/// A compiled star-segmented pattern.
#[derive(Debug, Clone)]
pub struct PatternElement {
    pattern: String,
    segments: Vec<String>,
    case_insensitive: bool,
}

impl PatternElement {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self> {
        if pattern.contains("**") {
            return Err(EvalError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "`**` is not allowed in patterns".into(),
            });
        }

        let folded = if case_insensitive {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };

        Ok(PatternElement {
            pattern: pattern.to_string(),
            segments: folded.split('*').map(str::to_string).collect(),
            case_insensitive,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.case_insensitive {
            self.matches_folded(&value.to_lowercase())
        } else {
            self.matches_folded(value)
        }
    }

    fn matches_folded(&self, value: &str) -> bool {
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return value.is_empty(),
        };
        // no wildcard at all
        let Some((last, middle)) = rest.split_last() else {
            return value == first;
        };

        let Some(mut remain) = value.strip_prefix(first.as_str()) else {
            return false;
        };
        if remain.len() < last.len() {
            return false;
        }
        let Some(head) = remain.strip_suffix(last.as_str()) else {
            return false;
        };
        remain = head;

        for segment in middle.iter().filter(|s| !s.is_empty()) {
            match remain.find(segment.as_str()) {
                Some(idx) => remain = &remain[idx + segment.len()..],
                None => return false,
            }
        }
        true
    }
}

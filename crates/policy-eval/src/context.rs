//! Per-event evaluation context and match reporting.
//!
//! A `Context` is created for one event and owned by one evaluation. When an
//! operator's closure produces a result worth explaining, it appends a
//! [`MatchingSubExpr`] pair: one record per operand side.

use serde::Serialize;

use crate::event::Event;

/// One side of a reported comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchingValue {
    /// Event field the operand came from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Value observed (field side) or literal matched (static side).
    pub value: serde_json::Value,
    /// Source offset of the operand in the rule expression.
    pub offset: usize,
}

impl MatchingValue {
    pub fn new(field: Option<&str>, value: impl Into<serde_json::Value>, offset: usize) -> Self {
        MatchingValue {
            field: field.map(str::to_string),
            value: value.into(),
            offset,
        }
    }

    /// Placeholder for a side that carries nothing to report.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.field.is_none() && self.value.is_null()
    }
}

/// A reported pair of operand records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchingSubExpr {
    pub a: MatchingValue,
    pub b: MatchingValue,
}

impl MatchingSubExpr {
    /// Fields named on either side.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.a
            .field
            .as_deref()
            .into_iter()
            .chain(self.b.field.as_deref())
    }
}

/// State carried through a single evaluation.
#[derive(Debug)]
pub struct Context<'a> {
    event: Event<'a>,
    matching_sub_exprs: Vec<MatchingSubExpr>,
}

impl<'a> Context<'a> {
    pub fn new(event: Event<'a>) -> Self {
        Context {
            event,
            matching_sub_exprs: Vec::new(),
        }
    }

    pub fn from_value(value: &'a serde_json::Value) -> Self {
        Self::new(Event::from_value(value))
    }

    pub fn event(&self) -> &Event<'a> {
        &self.event
    }

    pub fn add_matching_sub_expr(&mut self, a: MatchingValue, b: MatchingValue) {
        self.matching_sub_exprs.push(MatchingSubExpr { a, b });
    }

    pub fn matching_sub_exprs(&self) -> &[MatchingSubExpr] {
        &self.matching_sub_exprs
    }

    /// Take the reported records, leaving the context empty.
    pub fn take_matching_sub_exprs(&mut self) -> Vec<MatchingSubExpr> {
        std::mem::take(&mut self.matching_sub_exprs)
    }

    /// Point the context at another event and drop previous reports.
    pub fn reset(&mut self, event: Event<'a>) {
        self.event = event;
        self.matching_sub_exprs.clear();
    }
}

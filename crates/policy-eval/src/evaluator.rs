//! Typed evaluator nodes.
//!
//! An [`Evaluator`] is a compiled sub-expression: either a constant
//! ([`Eval::Static`]) or a closure run once per event ([`Eval::Dynamic`]).
//! Which one is fixed when the node is built. Nodes also carry the metadata
//! the optimizer reads without running them: cost weight, originating field
//! and determinism for the focus field of the compilation pass.

use std::fmt;
use std::sync::Arc;

use ipnet::IpNet;

use crate::cidr::CidrValues;
use crate::context::Context;
use crate::error::Result;
use crate::matcher::{StringMatcher, StringValues};
use crate::value::{FieldValueType, StringCmpOpts};

// =============================================================================
// Weights
// =============================================================================

/// Cost of a plain field accessor.
pub const FUNCTION_WEIGHT: usize = 5;
/// Cost added per element of a static array or value set.
pub const IN_ARRAY_WEIGHT: usize = 10;
/// Cost added by a glob or pattern matcher.
pub const PATTERN_WEIGHT: usize = 80;
/// Cost added by a regexp matcher.
pub const REGEXP_WEIGHT: usize = 100;

// =============================================================================
// Nodes
// =============================================================================

/// Per-event closure.
pub type EvalFn<T> = Arc<dyn Fn(&mut Context<'_>) -> T + Send + Sync>;

/// Either a constant or a per-event computation.
pub enum Eval<T> {
    Static(T),
    Dynamic(EvalFn<T>),
}

impl<T: Clone> Clone for Eval<T> {
    fn clone(&self) -> Self {
        match self {
            Eval::Static(v) => Eval::Static(v.clone()),
            Eval::Dynamic(f) => Eval::Dynamic(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Eval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eval::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Eval::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A compiled sub-expression producing a `T`.
#[derive(Clone)]
pub struct Evaluator<T> {
    pub eval: Eval<T>,
    /// Event field this node reads, when it maps 1:1 to a field.
    pub field: Option<String>,
    pub weight: usize,
    pub offset: usize,
    /// Interpretation of a static string literal.
    pub value_type: FieldValueType,
    /// Comparison options attached to a field operand.
    pub string_cmp_opts: StringCmpOpts,
    deterministic: bool,
    origin_field: Option<String>,
}

pub type BoolEvaluator = Evaluator<bool>;
pub type IntEvaluator = Evaluator<i64>;
pub type StringEvaluator = Evaluator<String>;
pub type StringArrayEvaluator = Evaluator<Vec<String>>;
/// Value set for `in` comparisons. Dynamic producers must return compiled sets.
pub type StringValuesEvaluator = Evaluator<StringValues>;
pub type IntArrayEvaluator = Evaluator<Vec<i64>>;
pub type BoolArrayEvaluator = Evaluator<Vec<bool>>;
pub type CidrEvaluator = Evaluator<IpNet>;
pub type CidrArrayEvaluator = Evaluator<Vec<IpNet>>;
pub type CidrValuesEvaluator = Evaluator<CidrValues>;

impl<T> Evaluator<T> {
    fn with_eval(eval: Eval<T>) -> Self {
        Evaluator {
            eval,
            field: None,
            weight: 0,
            offset: 0,
            value_type: FieldValueType::Scalar,
            string_cmp_opts: StringCmpOpts::default(),
            deterministic: false,
            origin_field: None,
        }
    }

    /// A constant.
    pub fn from_value(value: T) -> Self {
        Self::with_eval(Eval::Static(value))
    }

    /// A per-event computation not tied to a single field.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> T + Send + Sync + 'static,
    {
        Self::with_eval(Eval::Dynamic(Arc::new(f)))
    }

    /// A per-event read of `field`.
    pub fn from_field<F>(field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> T + Send + Sync + 'static,
    {
        let field = field.into();
        let mut evaluator = Self::from_fn(f).with_weight(FUNCTION_WEIGHT);
        evaluator.origin_field = Some(field.clone());
        evaluator.field = Some(field);
        evaluator
    }

    pub fn with_weight(mut self, weight: usize) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_value_type(mut self, value_type: FieldValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_string_cmp_opts(mut self, opts: StringCmpOpts) -> Self {
        self.string_cmp_opts = opts;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub(crate) fn with_origin_field(mut self, field: Option<String>) -> Self {
        self.origin_field = field;
        self
    }

    pub fn is_static(&self) -> bool {
        matches!(self.eval, Eval::Static(_))
    }

    pub fn static_value(&self) -> Option<&T> {
        match &self.eval {
            Eval::Static(v) => Some(v),
            Eval::Dynamic(_) => None,
        }
    }

    pub fn get_field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Field the node was derived from, kept through unary operators.
    pub fn origin_field(&self) -> Option<&str> {
        self.origin_field.as_deref()
    }

    /// Whether the node's value is known not to vary with anything but `field`.
    pub fn is_deterministic_for(&self, field: &str) -> bool {
        self.deterministic || self.field.as_deref() == Some(field)
    }

    /// [`Self::is_deterministic_for`] against an optional focus.
    pub(crate) fn deterministic_for(&self, focus: Option<&str>) -> bool {
        self.deterministic || focus.is_some_and(|f| self.field.as_deref() == Some(f))
    }
}

impl<T: Clone> Evaluator<T> {
    /// Evaluate the node for the event held by `ctx`.
    pub fn eval(&self, ctx: &mut Context<'_>) -> T {
        match &self.eval {
            Eval::Static(v) => v.clone(),
            Eval::Dynamic(f) => f(ctx),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Evaluator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("eval", &self.eval)
            .field("field", &self.field)
            .field("weight", &self.weight)
            .field("offset", &self.offset)
            .field("deterministic", &self.deterministic)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Event field accessors
// =============================================================================

impl StringEvaluator {
    /// Read a string field; missing fields read as `""`.
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| {
            ctx.event().get_str(&name).unwrap_or_default().to_string()
        })
    }

    /// Matcher for a static literal compared against a field using `opts`.
    ///
    /// Returns `None` for dynamic nodes and for plain scalars under default
    /// options, where direct equality is enough.
    pub fn to_string_matcher(&self, opts: StringCmpOpts) -> Result<Option<StringMatcher>> {
        let Eval::Static(value) = &self.eval else {
            return Ok(None);
        };
        if self.value_type == FieldValueType::Scalar && opts.is_default() {
            return Ok(None);
        }
        StringMatcher::new(self.value_type, value, opts).map(Some)
    }
}

impl IntEvaluator {
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| ctx.event().get_int(&name).unwrap_or_default())
    }
}

impl BoolEvaluator {
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| {
            ctx.event().get_bool(&name).unwrap_or_default()
        })
    }
}

impl StringArrayEvaluator {
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| ctx.event().get_str_array(&name))
    }
}

impl IntArrayEvaluator {
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| ctx.event().get_int_array(&name))
    }
}

impl BoolArrayEvaluator {
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| ctx.event().get_bool_array(&name))
    }
}

impl CidrEvaluator {
    /// Read an address or range field; missing fields read as `0.0.0.0/32`.
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| {
            ctx.event()
                .get_ipnet(&name)
                .unwrap_or_else(|| IpNet::from(std::net::IpAddr::from([0, 0, 0, 0])))
        })
        .with_value_type(FieldValueType::IpNet)
    }
}

impl CidrArrayEvaluator {
    pub fn event_field(field: &str) -> Self {
        let name = field.to_string();
        Self::from_field(field, move |ctx| ctx.event().get_ipnet_array(&name))
            .with_value_type(FieldValueType::IpNet)
    }
}

impl StringValuesEvaluator {
    /// Static value set from string literals and their type tags.
    pub fn from_literals<'s>(
        literals: impl IntoIterator<Item = (&'s str, FieldValueType)>,
    ) -> Self {
        let mut values = StringValues::new();
        for (literal, value_type) in literals {
            values.append_field_value(crate::value::FieldValue::new(literal, value_type));
        }
        Self::from_value(values)
    }
}

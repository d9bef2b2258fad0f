//! # policy-eval
//!
//! Compiler and evaluator for boolean rule expressions over JSON events.
//!
//! A parser (not part of this crate) turns a rule such as
//! `process.file.path == "/bin/sh" && process.uid in [0, 1]` into calls to the
//! operator functions in [`operators`]. Each call returns a typed
//! [`Evaluator`] node, and the root node is run once per event.
//!
//! ## Architecture
//!
//! - **Evaluators**: a node is either a constant or a per-event closure.
//!   Operators fold constant operands at build time, so only the parts of an
//!   expression that depend on the event run on the hot path.
//! - **Weights**: every node has a cost estimate. `and`/`or` run the cheaper
//!   child first.
//! - **State**: one compilation pass threads a [`State`] through every
//!   operator. It records the literals each field is compared against and
//!   optionally a focus field for determinism analysis.
//! - **Matchers**: string literals are tagged as scalar, glob, pattern or
//!   regexp and compiled into a [`StringMatcher`] once.
//! - **Reports**: when a comparison holds, the operand values are appended to
//!   the [`Context`] so callers can explain the match.
//!
//! ## Quick Start
//!
//! ```rust
//! use policy_eval::{Context, IntArrayEvaluator, IntEvaluator, State, StringEvaluator};
//! use policy_eval::operators::{and, int_array_contains, string_equals};
//! use serde_json::json;
//!
//! let mut state = State::new();
//!
//! let path = string_equals(
//!     &StringEvaluator::event_field("process.file.path"),
//!     &StringEvaluator::from_value("/bin/sh".to_string()),
//!     &mut state,
//! )
//! .unwrap();
//! let uid = int_array_contains(
//!     &IntEvaluator::event_field("process.uid"),
//!     &IntArrayEvaluator::from_value(vec![0, 1]),
//!     &mut state,
//! )
//! .unwrap();
//! let rule = and(&path, &uid, &mut state).unwrap();
//!
//! let event = json!({"process": {"file": {"path": "/bin/sh"}, "uid": 0}});
//! let mut ctx = Context::from_value(&event);
//! assert!(rule.eval(&mut ctx));
//! assert_eq!(ctx.matching_sub_exprs().len(), 2);
//! ```

pub mod cidr;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod glob;
pub mod matcher;
pub mod operators;
pub mod pattern;
pub mod state;
pub mod value;

// Re-export the most commonly used types at crate root
pub use cidr::CidrValues;
pub use context::{Context, MatchingSubExpr, MatchingValue};
pub use error::{EvalError, Result};
pub use evaluator::{
    BoolArrayEvaluator, BoolEvaluator, CidrArrayEvaluator, CidrEvaluator, CidrValuesEvaluator,
    Eval, EvalFn, Evaluator, IntArrayEvaluator, IntEvaluator, StringArrayEvaluator,
    StringEvaluator, StringValuesEvaluator,
};
pub use event::Event;
pub use matcher::{StringMatcher, StringValues};
pub use state::State;
pub use value::{FieldValue, FieldValueType, LiteralValue, StringCmpOpts};

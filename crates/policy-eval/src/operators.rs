//! Operators combining evaluator nodes.
//!
//! Every binary operator specializes on the shape of its operands:
//!
//! - both dynamic: a closure running both children,
//! - both static: the result is computed once, here, and stored as a constant,
//! - one static: the constant is captured and only the dynamic child runs.
//!   When the dynamic side is bound to a field, the constant is registered
//!   against that field in the [`State`].
//!
//! The result is deterministic for the focus field when either operand is.
//! Comparisons are additionally never deterministic when an operand is bound
//! to a field other than the focus.
//!
//! When the state has a focus, `and`, `or` and `not` pin every dynamic child
//! that is not deterministic for it to a closure returning `true`. Trees built
//! that way answer "can this expression be satisfied when only the focus field
//! varies" and must not be used to evaluate events.

use std::sync::Arc;

use ipnet::IpNet;
use serde_json::Value;

use crate::cidr::{CidrValues, ipnet_equals, ipnets_match};
use crate::context::{Context, MatchingValue};
use crate::error::Result;
use crate::evaluator::{
    BoolArrayEvaluator, BoolEvaluator, CidrArrayEvaluator, CidrEvaluator, CidrValuesEvaluator,
    Eval, EvalFn, Evaluator, IN_ARRAY_WEIGHT, IntArrayEvaluator, IntEvaluator,
    StringArrayEvaluator, StringEvaluator, StringValuesEvaluator,
};
use crate::matcher::{StringMatcher, StringValues, eq_fold};
use crate::state::State;
use crate::value::{FieldValue, FieldValueType, StringCmpOpts};

// =============================================================================
// Determinism
// =============================================================================

/// Determinism rule for comparison-style operators.
pub fn is_arithm_deterministic<A, B>(a: &Evaluator<A>, b: &Evaluator<B>, state: &State) -> bool {
    let focus = state.field();
    let is_dc = a.deterministic_for(focus) || b.deterministic_for(focus);

    match focus {
        Some(focus) => {
            let foreign = |f: Option<&str>| f.is_some_and(|f| f != focus);
            is_dc && !foreign(a.get_field()) && !foreign(b.get_field())
        }
        None => is_dc,
    }
}

// =============================================================================
// Logical operators
// =============================================================================

fn always_true() -> EvalFn<bool> {
    Arc::new(|_: &mut Context<'_>| true)
}

/// Replace `f` by `always_true` when `node` does not depend on the focus alone.
fn pin(node: &BoolEvaluator, f: &EvalFn<bool>, focus: Option<&str>) -> EvalFn<bool> {
    if focus.is_some() && !node.deterministic_for(focus) {
        always_true()
    } else {
        Arc::clone(f)
    }
}

/// One child of a logical operator, remembering which side it came from.
struct Operand {
    eval: EvalFn<bool>,
    field: Option<String>,
    offset: usize,
    left: bool,
}

impl Operand {
    fn new(node: &BoolEvaluator, eval: EvalFn<bool>, left: bool) -> Self {
        Operand {
            eval,
            field: node.field.clone(),
            offset: node.offset,
            left,
        }
    }

    fn report(&self, ctx: &mut Context<'_>, value: bool) {
        let Some(field) = &self.field else {
            return;
        };
        let mv = MatchingValue {
            field: Some(field.clone()),
            value: Value::Bool(value),
            offset: self.offset,
        };
        if self.left {
            ctx.add_matching_sub_expr(mv, MatchingValue::empty());
        } else {
            ctx.add_matching_sub_expr(MatchingValue::empty(), mv);
        }
    }
}

/// Cheaper operand first.
fn ordered(a: Operand, b: Operand, a_weight: usize, b_weight: usize) -> (Operand, Operand) {
    if a_weight > b_weight { (b, a) } else { (a, b) }
}

/// Logical OR.
pub fn or(a: &BoolEvaluator, b: &BoolEvaluator, state: &mut State) -> Result<BoolEvaluator> {
    let focus = state.field().map(str::to_string);
    let focus = focus.as_deref();
    let is_dc = a.deterministic_for(focus) || b.deterministic_for(focus);

    let evaluator = match (&a.eval, &b.eval) {
        (Eval::Dynamic(ea), Eval::Dynamic(eb)) => {
            let (first, second) = ordered(
                Operand::new(a, pin(a, ea, focus), true),
                Operand::new(b, pin(b, eb, focus), false),
                a.weight,
                b.weight,
            );
            BoolEvaluator::from_fn(move |ctx| {
                if (first.eval)(ctx) {
                    first.report(ctx, true);
                    return true;
                }
                if (second.eval)(ctx) {
                    second.report(ctx, true);
                    return true;
                }
                false
            })
            .with_weight(a.weight + b.weight)
        }
        (Eval::Static(va), Eval::Static(vb)) => BoolEvaluator::from_value(*va || *vb),
        (Eval::Dynamic(ea), Eval::Static(vb)) => {
            if let Some(field) = a.get_field() {
                state.update_field_values(field, FieldValue::scalar(*vb))?;
            }
            let side = Operand::new(a, pin(a, ea, focus), true);
            let vb = *vb;
            BoolEvaluator::from_fn(move |ctx| {
                let va = (side.eval)(ctx);
                let res = va || vb;
                if res {
                    side.report(ctx, va);
                }
                res
            })
            .with_weight(a.weight)
        }
        (Eval::Static(va), Eval::Dynamic(eb)) => {
            if let Some(field) = b.get_field() {
                state.update_field_values(field, FieldValue::scalar(*va))?;
            }
            let side = Operand::new(b, pin(b, eb, focus), false);
            let va = *va;
            BoolEvaluator::from_fn(move |ctx| {
                let vb = (side.eval)(ctx);
                let res = va || vb;
                if res {
                    side.report(ctx, vb);
                }
                res
            })
            .with_weight(b.weight)
        }
    };

    Ok(evaluator.with_deterministic(is_dc))
}

/// Logical AND.
pub fn and(a: &BoolEvaluator, b: &BoolEvaluator, state: &mut State) -> Result<BoolEvaluator> {
    let focus = state.field().map(str::to_string);
    let focus = focus.as_deref();
    let is_dc = a.deterministic_for(focus) || b.deterministic_for(focus);

    let evaluator = match (&a.eval, &b.eval) {
        (Eval::Dynamic(ea), Eval::Dynamic(eb)) => {
            let (first, second) = ordered(
                Operand::new(a, pin(a, ea, focus), true),
                Operand::new(b, pin(b, eb, focus), false),
                a.weight,
                b.weight,
            );
            BoolEvaluator::from_fn(move |ctx| {
                if !(first.eval)(ctx) || !(second.eval)(ctx) {
                    return false;
                }
                first.report(ctx, true);
                second.report(ctx, true);
                true
            })
            .with_weight(a.weight + b.weight)
        }
        (Eval::Static(va), Eval::Static(vb)) => BoolEvaluator::from_value(*va && *vb),
        (Eval::Dynamic(ea), Eval::Static(vb)) => {
            if let Some(field) = a.get_field() {
                state.update_field_values(field, FieldValue::scalar(*vb))?;
            }
            let side = Operand::new(a, pin(a, ea, focus), true);
            let vb = *vb;
            BoolEvaluator::from_fn(move |ctx| {
                let res = vb && (side.eval)(ctx);
                if res {
                    side.report(ctx, true);
                }
                res
            })
            .with_weight(a.weight)
        }
        (Eval::Static(va), Eval::Dynamic(eb)) => {
            if let Some(field) = b.get_field() {
                state.update_field_values(field, FieldValue::scalar(*va))?;
            }
            let side = Operand::new(b, pin(b, eb, focus), false);
            let va = *va;
            BoolEvaluator::from_fn(move |ctx| {
                let res = va && (side.eval)(ctx);
                if res {
                    side.report(ctx, true);
                }
                res
            })
            .with_weight(b.weight)
        }
    };

    Ok(evaluator.with_deterministic(is_dc))
}

/// Logical NOT.
pub fn not(a: &BoolEvaluator, state: &State) -> BoolEvaluator {
    let focus = state.field();
    let is_dc = a.deterministic_for(focus);

    let evaluator = match &a.eval {
        Eval::Dynamic(ea) => {
            if focus.is_some() && !is_dc {
                BoolEvaluator::from_fn(|_| true)
            } else {
                let ea = Arc::clone(ea);
                BoolEvaluator::from_fn(move |ctx| !ea(ctx))
            }
        }
        Eval::Static(va) => BoolEvaluator::from_value(!*va),
    };

    evaluator
        .with_weight(a.weight)
        .with_deterministic(is_dc)
        .with_origin_field(a.origin_field().map(str::to_string))
}

// =============================================================================
// Integer unary operators
// =============================================================================

fn int_unary(a: &IntEvaluator, state: &State, op: fn(i64) -> i64) -> IntEvaluator {
    let is_dc = a.deterministic_for(state.field());

    let evaluator = match &a.eval {
        Eval::Dynamic(ea) => {
            let ea = Arc::clone(ea);
            IntEvaluator::from_fn(move |ctx| op(ea(ctx)))
        }
        Eval::Static(va) => IntEvaluator::from_value(op(*va)),
    };

    evaluator
        .with_weight(a.weight)
        .with_deterministic(is_dc)
        .with_origin_field(a.origin_field().map(str::to_string))
}

/// Arithmetic negation.
pub fn minus(a: &IntEvaluator, state: &State) -> IntEvaluator {
    int_unary(a, state, i64::wrapping_neg)
}

/// Bitwise NOT.
pub fn int_not(a: &IntEvaluator, state: &State) -> IntEvaluator {
    int_unary(a, state, |v| !v)
}

// =============================================================================
// Integer binary operators
// =============================================================================

fn int_arith(
    a: &IntEvaluator,
    b: &IntEvaluator,
    state: &State,
    op: fn(i64, i64) -> i64,
) -> IntEvaluator {
    let is_dc = is_arithm_deterministic(a, b, state);

    let evaluator = match (&a.eval, &b.eval) {
        (Eval::Dynamic(ea), Eval::Dynamic(eb)) => {
            let (ea, eb) = (Arc::clone(ea), Arc::clone(eb));
            IntEvaluator::from_fn(move |ctx| op(ea(ctx), eb(ctx))).with_weight(a.weight + b.weight)
        }
        (Eval::Static(va), Eval::Static(vb)) => IntEvaluator::from_value(op(*va, *vb)),
        (Eval::Dynamic(ea), Eval::Static(vb)) => {
            let (ea, vb) = (Arc::clone(ea), *vb);
            IntEvaluator::from_fn(move |ctx| op(ea(ctx), vb)).with_weight(a.weight)
        }
        (Eval::Static(va), Eval::Dynamic(eb)) => {
            let (va, eb) = (*va, Arc::clone(eb));
            IntEvaluator::from_fn(move |ctx| op(va, eb(ctx))).with_weight(b.weight)
        }
    };

    evaluator.with_deterministic(is_dc)
}

/// Bitwise AND.
pub fn int_and(a: &IntEvaluator, b: &IntEvaluator, state: &State) -> IntEvaluator {
    int_arith(a, b, state, |x, y| x & y)
}

/// Bitwise OR.
pub fn int_or(a: &IntEvaluator, b: &IntEvaluator, state: &State) -> IntEvaluator {
    int_arith(a, b, state, |x, y| x | y)
}

/// Bitwise XOR.
pub fn int_xor(a: &IntEvaluator, b: &IntEvaluator, state: &State) -> IntEvaluator {
    int_arith(a, b, state, |x, y| x ^ y)
}

// =============================================================================
// Comparisons
// =============================================================================

/// Build the four specializations of a comparison.
///
/// `op` returns the pair of values to report when the comparison holds.
/// `static_cost` is added to the left weight when the right side is static.
fn compare<A, B, F>(
    a: &Evaluator<A>,
    b: &Evaluator<B>,
    is_dc: bool,
    static_cost: usize,
    op: F,
) -> BoolEvaluator
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    F: Fn(&A, &B) -> Option<(Value, Value)> + Send + Sync + 'static,
{
    let (fa, fb) = (a.field.clone(), b.field.clone());
    let (oa, ob) = (a.offset, b.offset);
    let report = move |ctx: &mut Context<'_>, (ma, mb): (Value, Value)| {
        ctx.add_matching_sub_expr(
            MatchingValue {
                field: fa.clone(),
                value: ma,
                offset: oa,
            },
            MatchingValue {
                field: fb.clone(),
                value: mb,
                offset: ob,
            },
        );
    };

    let evaluator = match (&a.eval, &b.eval) {
        (Eval::Dynamic(ea), Eval::Dynamic(eb)) => {
            let (ea, eb) = (Arc::clone(ea), Arc::clone(eb));
            BoolEvaluator::from_fn(move |ctx| {
                let (va, vb) = (ea(ctx), eb(ctx));
                op(&va, &vb).map(|m| report(ctx, m)).is_some()
            })
            .with_weight(a.weight + b.weight)
        }
        (Eval::Static(va), Eval::Static(vb)) => {
            BoolEvaluator::from_value(op(va, vb).is_some()).with_weight(a.weight + static_cost)
        }
        (Eval::Dynamic(ea), Eval::Static(vb)) => {
            let (ea, vb) = (Arc::clone(ea), vb.clone());
            BoolEvaluator::from_fn(move |ctx| {
                let va = ea(ctx);
                op(&va, &vb).map(|m| report(ctx, m)).is_some()
            })
            .with_weight(a.weight + static_cost)
        }
        (Eval::Static(va), Eval::Dynamic(eb)) => {
            let (va, eb) = (va.clone(), Arc::clone(eb));
            BoolEvaluator::from_fn(move |ctx| {
                let vb = eb(ctx);
                op(&va, &vb).map(|m| report(ctx, m)).is_some()
            })
            .with_weight(b.weight)
        }
    };

    evaluator.with_deterministic(is_dc)
}

/// Register the static side of a comparison against the field of the other.
fn register_static<A, B>(
    state: &mut State,
    field_side: &Evaluator<A>,
    static_side: &Evaluator<B>,
    to_value: impl FnOnce(&B) -> FieldValue,
) -> Result<()> {
    if let (Some(field), Some(value)) = (field_side.get_field(), static_side.static_value()) {
        state.update_field_values(field, to_value(value))?;
    }
    Ok(())
}

/// Register every element of a static collection against `field_side`.
fn register_each<A, B, I>(
    state: &mut State,
    field_side: &Evaluator<A>,
    static_side: &Evaluator<B>,
    to_values: impl FnOnce(&B) -> I,
) -> Result<()>
where
    I: IntoIterator<Item = FieldValue>,
{
    if let (Some(field), Some(values)) = (field_side.get_field(), static_side.static_value()) {
        for value in to_values(values) {
            state.update_field_values(field, value)?;
        }
    }
    Ok(())
}

fn array_cost(len: Option<usize>) -> usize {
    len.map_or(0, |n| IN_ARRAY_WEIGHT * n)
}

fn net_json(net: &IpNet) -> Value {
    Value::String(net.to_string())
}

fn nets_json(nets: &[IpNet]) -> Value {
    Value::Array(nets.iter().map(net_json).collect())
}

// -- Strings ------------------------------------------------------------------

/// String comparison strategy, chosen once per operator.
enum StrCmp {
    Exact,
    Fold,
    /// Matcher built from the right literal, applied to the left value.
    MatchLeft(StringMatcher),
    /// Matcher built from the left literal, applied to the right value.
    MatchRight(StringMatcher),
}

impl StrCmp {
    fn fields(a_opts: StringCmpOpts, b_opts: StringCmpOpts) -> Self {
        if a_opts.case_insensitive || b_opts.case_insensitive {
            StrCmp::Fold
        } else {
            StrCmp::Exact
        }
    }

    fn eval(&self, a: &str, b: &str) -> bool {
        match self {
            StrCmp::Exact => a == b,
            StrCmp::Fold => eq_fold(a, b),
            StrCmp::MatchLeft(m) => m.matches(a),
            StrCmp::MatchRight(m) => m.matches(b),
        }
    }

    fn cost(&self) -> usize {
        match self {
            StrCmp::Exact | StrCmp::Fold => 0,
            StrCmp::MatchLeft(m) | StrCmp::MatchRight(m) => m.weight(),
        }
    }
}

/// Add the matcher's cost to a comparison, whichever side holds the literal.
fn with_matcher_cost(e: BoolEvaluator, cmp_cost: usize) -> BoolEvaluator {
    let weight = e.weight + cmp_cost;
    e.with_weight(weight)
}

/// String equality, honoring the literal's type tag and the field's options.
pub fn string_equals(
    a: &StringEvaluator,
    b: &StringEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_static(state, a, b, |v| FieldValue::new(v.as_str(), b.value_type))?;
    register_static(state, b, a, |v| FieldValue::new(v.as_str(), a.value_type))?;

    let cmp = match (a.get_field(), b.get_field()) {
        (Some(_), Some(_)) => StrCmp::fields(a.string_cmp_opts, b.string_cmp_opts),
        (Some(_), None) => b
            .to_string_matcher(a.string_cmp_opts)?
            .map_or(StrCmp::Exact, StrCmp::MatchLeft),
        (None, Some(_)) => a
            .to_string_matcher(b.string_cmp_opts)?
            .map_or(StrCmp::Exact, StrCmp::MatchRight),
        (None, None) => StrCmp::Exact,
    };

    let cmp_cost = cmp.cost();
    let e = compare(a, b, is_dc, 0, move |va: &String, vb: &String| {
        cmp.eval(va, vb)
            .then(|| (Value::from(va.as_str()), Value::from(vb.as_str())))
    });
    Ok(with_matcher_cost(e, cmp_cost))
}

/// `a` equals at least one element of the array `b`.
pub fn string_array_contains(
    a: &StringEvaluator,
    b: &StringArrayEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &Vec<String>| {
        values
            .iter()
            .map(|v| FieldValue::scalar(v.as_str()))
            .collect::<Vec<_>>()
    })?;
    register_static(state, b, a, |v| FieldValue::new(v.as_str(), a.value_type))?;

    let cmp = match (a.get_field(), b.get_field()) {
        (Some(_), Some(_)) => StrCmp::fields(a.string_cmp_opts, b.string_cmp_opts),
        (Some(_), None) if a.string_cmp_opts.case_insensitive => StrCmp::Fold,
        (None, Some(_)) => a
            .to_string_matcher(b.string_cmp_opts)?
            .map_or(StrCmp::Exact, StrCmp::MatchRight),
        _ => StrCmp::Exact,
    };

    let cost = array_cost(b.static_value().map(Vec::len));
    let cmp_cost = cmp.cost();
    let e = compare(a, b, is_dc, cost, move |va: &String, vb: &Vec<String>| {
        vb.iter()
            .find(|bs| cmp.eval(va, bs))
            .map(|m| (Value::from(va.as_str()), Value::from(m.as_str())))
    });
    Ok(with_matcher_cost(e, cmp_cost))
}

/// Compile a static value set with the options of the field it is tested on.
fn compiled_values(
    b: &StringValuesEvaluator,
    opts: StringCmpOpts,
) -> Result<StringValuesEvaluator> {
    let mut b = b.clone();
    if let Eval::Static(values) = &mut b.eval {
        values.compile(opts)?;
    }
    Ok(b)
}

fn string_values_cost(b: &StringValuesEvaluator) -> usize {
    array_cost(b.static_value().map(|v| v.field_values().len()))
        + b.static_value().map_or(0, StringValues::weight)
}

/// `a` matches at least one entry of the value set `b`.
///
/// A static set is compiled here with `a`'s options. A dynamic set is used as
/// produced, so its producer must return it already compiled; an uncompiled
/// set only ever matches nothing.
pub fn string_values_contains(
    a: &StringEvaluator,
    b: &StringValuesEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &StringValues| {
        values.field_values().to_vec()
    })?;

    let b = compiled_values(b, a.string_cmp_opts)?;
    let cost = string_values_cost(&b);

    Ok(compare(a, &b, is_dc, cost, |va: &String, vb: &StringValues| {
        vb.matches(va)
            .map(|m| (Value::from(va.as_str()), Value::String(m)))
    }))
}

/// Weak match: at least one element of `a` matches the value set `b`.
///
/// Dynamic sets must arrive compiled, as for [`string_values_contains`].
pub fn string_array_matches(
    a: &StringArrayEvaluator,
    b: &StringValuesEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &StringValues| {
        values.field_values().to_vec()
    })?;

    let b = compiled_values(b, a.string_cmp_opts)?;
    let cost = string_values_cost(&b);

    Ok(compare(a, &b, is_dc, cost, |va: &Vec<String>, vb: &StringValues| {
        va.iter().find_map(|s| {
            vb.matches(s)
                .map(|m| (Value::from(s.as_str()), Value::String(m)))
        })
    }))
}

// -- Integers and booleans ----------------------------------------------------

fn int_compare(
    a: &IntEvaluator,
    b: &IntEvaluator,
    state: &mut State,
    op: fn(i64, i64) -> bool,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_static(state, a, b, |v| FieldValue::scalar(*v))?;
    register_static(state, b, a, |v| FieldValue::scalar(*v))?;

    Ok(compare(a, b, is_dc, 0, move |va: &i64, vb: &i64| {
        op(*va, *vb).then(|| (Value::from(*va), Value::from(*vb)))
    }))
}

pub fn int_equals(a: &IntEvaluator, b: &IntEvaluator, state: &mut State) -> Result<BoolEvaluator> {
    int_compare(a, b, state, |x, y| x == y)
}

pub fn greater_than(
    a: &IntEvaluator,
    b: &IntEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    int_compare(a, b, state, |x, y| x > y)
}

pub fn greater_or_equal_than(
    a: &IntEvaluator,
    b: &IntEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    int_compare(a, b, state, |x, y| x >= y)
}

pub fn lesser_than(
    a: &IntEvaluator,
    b: &IntEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    int_compare(a, b, state, |x, y| x < y)
}

pub fn lesser_or_equal_than(
    a: &IntEvaluator,
    b: &IntEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    int_compare(a, b, state, |x, y| x <= y)
}

pub fn bool_equals(
    a: &BoolEvaluator,
    b: &BoolEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_static(state, a, b, |v| FieldValue::scalar(*v))?;
    register_static(state, b, a, |v| FieldValue::scalar(*v))?;

    Ok(compare(a, b, is_dc, 0, |va: &bool, vb: &bool| {
        (va == vb).then(|| (Value::Bool(*va), Value::Bool(*vb)))
    }))
}

/// `a` is one of the integers of `b`.
pub fn int_array_contains(
    a: &IntEvaluator,
    b: &IntArrayEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &Vec<i64>| {
        values.iter().map(|v| FieldValue::scalar(*v)).collect::<Vec<_>>()
    })?;
    register_static(state, b, a, |v| FieldValue::scalar(*v))?;

    let cost = array_cost(b.static_value().map(Vec::len));
    Ok(compare(a, b, is_dc, cost, |va: &i64, vb: &Vec<i64>| {
        vb.contains(va)
            .then(|| (Value::from(*va), Value::from(*va)))
    }))
}

/// Weak match: at least one element of `a` is in `b`.
pub fn int_array_matches(
    a: &IntArrayEvaluator,
    b: &IntArrayEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &Vec<i64>| {
        values.iter().map(|v| FieldValue::scalar(*v)).collect::<Vec<_>>()
    })?;

    let cost = array_cost(b.static_value().map(Vec::len));
    Ok(compare(a, b, is_dc, cost, |va: &Vec<i64>, vb: &Vec<i64>| {
        va.iter()
            .find(|x| vb.contains(x))
            .map(|x| (Value::from(*x), Value::from(*x)))
    }))
}

/// `a` is one of the booleans of `b`.
pub fn array_bool_contains(
    a: &BoolEvaluator,
    b: &BoolArrayEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &Vec<bool>| {
        values.iter().map(|v| FieldValue::scalar(*v)).collect::<Vec<_>>()
    })?;
    register_static(state, b, a, |v| FieldValue::scalar(*v))?;

    let cost = array_cost(b.static_value().map(Vec::len));
    Ok(compare(a, b, is_dc, cost, |va: &bool, vb: &Vec<bool>| {
        vb.contains(va)
            .then(|| (Value::Bool(*va), Value::Bool(*va)))
    }))
}

// -- Networks -----------------------------------------------------------------

fn ipnet_value(net: &IpNet) -> FieldValue {
    FieldValue::new(*net, FieldValueType::IpNet)
}

/// Same network, same prefix length.
pub fn cidr_equals(a: &CidrEvaluator, b: &CidrEvaluator, state: &mut State) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_static(state, a, b, ipnet_value)?;
    register_static(state, b, a, ipnet_value)?;

    Ok(compare(a, b, is_dc, 0, |va: &IpNet, vb: &IpNet| {
        ipnet_equals(va, vb).then(|| (net_json(va), net_json(vb)))
    }))
}

/// `a` overlaps at least one range of the set `b`.
pub fn cidr_values_contains(
    a: &CidrEvaluator,
    b: &CidrValuesEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &CidrValues| {
        values.field_values().to_vec()
    })?;

    let cost = array_cost(b.static_value().map(CidrValues::len));
    Ok(compare(a, b, is_dc, cost, |va: &IpNet, vb: &CidrValues| {
        vb.contains(va).map(|m| (net_json(va), net_json(&m)))
    }))
}

/// `a` overlaps at least one range of the array `b`.
pub fn cidr_array_contains(
    a: &CidrEvaluator,
    b: &CidrArrayEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &Vec<IpNet>| {
        values.iter().map(ipnet_value).collect::<Vec<_>>()
    })?;

    let cost = array_cost(b.static_value().map(Vec::len));
    Ok(compare(a, b, is_dc, cost, |va: &IpNet, vb: &Vec<IpNet>| {
        vb.iter()
            .find(|n| ipnets_match(va, n))
            .map(|m| (net_json(va), net_json(m)))
    }))
}

fn cidr_array_values<F>(
    a: &CidrArrayEvaluator,
    b: &CidrValuesEvaluator,
    state: &mut State,
    op: F,
) -> Result<BoolEvaluator>
where
    F: Fn(&Vec<IpNet>, &CidrValues) -> Option<(Value, Value)> + Send + Sync + 'static,
{
    let is_dc = is_arithm_deterministic(a, b, state);

    register_each(state, a, b, |values: &CidrValues| {
        values.field_values().to_vec()
    })?;

    let cost = array_cost(b.static_value().map(CidrValues::len));
    Ok(compare(a, b, is_dc, cost, op))
}

/// Weak match: at least one range of `a` is in the set `b`.
pub fn cidr_array_matches(
    a: &CidrArrayEvaluator,
    b: &CidrValuesEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    cidr_array_values(a, b, state, |va, vb| {
        vb.match_any(va).map(|m| (nets_json(va), net_json(&m)))
    })
}

/// Strong match: every range of `a` is in the set `b`.
pub fn cidr_array_matches_all(
    a: &CidrArrayEvaluator,
    b: &CidrValuesEvaluator,
    state: &mut State,
) -> Result<BoolEvaluator> {
    cidr_array_values(a, b, state, |va, vb| {
        vb.match_all(va)
            .then(|| (nets_json(va), nets_json(vb.ipnets())))
    })
}

/// At least one range of `a` contains the network address of `b`.
pub fn cidr_array_matches_cidr_evaluator(
    a: &CidrArrayEvaluator,
    b: &CidrEvaluator,
    state: &State,
) -> Result<BoolEvaluator> {
    let is_dc = is_arithm_deterministic(a, b, state);

    Ok(compare(a, b, is_dc, 0, |va: &Vec<IpNet>, vb: &IpNet| {
        va.iter()
            .find(|n| n.contains(&vb.network()))
            .map(|m| (net_json(m), net_json(vb)))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{PATTERN_WEIGHT, REGEXP_WEIGHT};
    use serde_json::json;

    fn flag(field: &str) -> BoolEvaluator {
        BoolEvaluator::event_field(field)
    }

    fn lit(s: &str) -> StringEvaluator {
        StringEvaluator::from_value(s.to_string())
    }

    fn run(e: &BoolEvaluator, event: serde_json::Value) -> (bool, usize) {
        let mut ctx = Context::from_value(&event);
        let res = e.eval(&mut ctx);
        (res, ctx.matching_sub_exprs().len())
    }

    /// Every shape of a bool operand for the values `x`.
    fn shapes(x: bool, field: &str) -> [BoolEvaluator; 2] {
        [BoolEvaluator::from_value(x), flag(field)]
    }

    #[test]
    fn test_or_and_agree_across_specializations() {
        for x in [false, true] {
            for y in [false, true] {
                let event = json!({"x": x, "y": y});
                for a in shapes(x, "x") {
                    for b in shapes(y, "y") {
                        let mut state = State::new();
                        let o = or(&a, &b, &mut state).unwrap();
                        assert_eq!(run(&o, event.clone()).0, x || y, "or({x}, {y})");
                        let n = and(&a, &b, &mut state).unwrap();
                        assert_eq!(run(&n, event.clone()).0, x && y, "and({x}, {y})");
                    }
                }
            }
        }
    }

    #[test]
    fn test_static_static_has_no_closure() {
        let mut state = State::new();
        let e = and(
            &BoolEvaluator::from_value(true),
            &BoolEvaluator::from_value(false),
            &mut state,
        )
        .unwrap();
        assert_eq!(e.static_value(), Some(&false));
    }

    #[test]
    fn test_not_not_is_identity() {
        let state = State::new();
        for x in [false, true] {
            let event = json!({"x": x});
            for a in shapes(x, "x") {
                let nn = not(&not(&a, &state), &state);
                assert_eq!(run(&nn, event.clone()).0, x);
                assert_eq!(nn.is_static(), a.is_static());
            }
        }
    }

    #[test]
    fn test_not_keeps_origin_field() {
        let state = State::new();
        let n = not(&flag("x"), &state);
        assert_eq!(n.origin_field(), Some("x"));
        assert_eq!(n.weight, flag("x").weight);
    }

    #[test]
    fn test_cheaper_operand_runs_first() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let tracked = |name: &'static str, weight: usize, result: bool| {
            let calls = Arc::clone(&calls);
            BoolEvaluator::from_fn(move |_| {
                calls.lock().unwrap().push(name);
                result
            })
            .with_weight(weight)
        };

        let mut state = State::new();
        let e = or(&tracked("heavy", 100, true), &tracked("light", 1, true), &mut state).unwrap();
        assert_eq!(e.weight, 101);
        assert!(run(&e, json!({})).0);
        assert_eq!(*calls.lock().unwrap(), vec!["light"]);

        calls.lock().unwrap().clear();
        let e = and(&tracked("heavy", 100, false), &tracked("light", 1, false), &mut state).unwrap();
        assert!(!run(&e, json!({})).0);
        assert_eq!(*calls.lock().unwrap(), vec!["light"]);
    }

    #[test]
    fn test_or_reports_matching_side() {
        let mut state = State::new();
        let e = or(&flag("x"), &flag("y"), &mut state).unwrap();

        let event = json!({"x": false, "y": true});
        let mut ctx = Context::from_value(&event);
        assert!(e.eval(&mut ctx));
        let reports = ctx.matching_sub_exprs();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].a.is_empty());
        assert_eq!(reports[0].b.field.as_deref(), Some("y"));
    }

    #[test]
    fn test_or_registers_static_against_field() {
        let mut state = State::new();
        or(&flag("x"), &BoolEvaluator::from_value(false), &mut state).unwrap();
        assert_eq!(state.field_values("x"), [FieldValue::scalar(false)]);
    }

    #[test]
    fn test_pinning_under_focus() {
        let mut state = State::with_field("x");
        // y is not deterministic for x, so it is pinned to true
        let e = and(&flag("x"), &flag("y"), &mut state).unwrap();
        assert!(e.is_deterministic_for("x"));
        assert!(run(&e, json!({"x": true, "y": false})).0);
        assert!(!run(&e, json!({"x": false, "y": true})).0);

        let n = not(&flag("y"), &state);
        assert!(run(&n, json!({"y": true})).0);
    }

    #[test]
    fn test_unary_int() {
        let state = State::new();
        assert_eq!(minus(&IntEvaluator::from_value(5), &state).static_value(), Some(&-5));
        assert_eq!(int_not(&IntEvaluator::from_value(0), &state).static_value(), Some(&-1));

        let e = minus(&IntEvaluator::event_field("n"), &state);
        let v = json!({"n": 3});
        assert_eq!(e.eval(&mut Context::from_value(&v)), -3);
        assert_eq!(e.origin_field(), Some("n"));
    }

    #[test]
    fn test_bitwise() {
        let state = State::new();
        let flags = IntEvaluator::event_field("flags");
        let mask = IntEvaluator::from_value(0b100);
        let e = int_and(&flags, &mask, &state);
        let v = json!({"flags": 0b110});
        assert_eq!(e.eval(&mut Context::from_value(&v)), 0b100);
        assert_eq!(
            int_or(&IntEvaluator::from_value(1), &IntEvaluator::from_value(2), &state).static_value(),
            Some(&3)
        );
        assert_eq!(
            int_xor(&IntEvaluator::from_value(3), &IntEvaluator::from_value(1), &state).static_value(),
            Some(&2)
        );
    }

    #[test]
    fn test_string_equals_symmetric() {
        let cases = [("a", "a"), ("a", "b"), ("", ""), ("Abc", "abc")];
        for (x, y) in cases {
            let event = json!({"x": x, "y": y});
            let shapes_x = [lit(x), StringEvaluator::event_field("x")];
            let shapes_y = [lit(y), StringEvaluator::event_field("y")];
            for a in &shapes_x {
                for b in &shapes_y {
                    let mut state = State::new();
                    let ab = string_equals(a, b, &mut state).unwrap();
                    let ba = string_equals(b, a, &mut state).unwrap();
                    assert_eq!(run(&ab, event.clone()).0, x == y);
                    assert_eq!(run(&ba, event.clone()).0, x == y);
                }
            }
        }
    }

    #[test]
    fn test_string_equals_glob_literal() {
        let mut state = State::new();
        let path = StringEvaluator::event_field("path");
        let glob = lit("/usr/bin/*").with_value_type(FieldValueType::Glob);

        let e = string_equals(&path, &glob, &mut state).unwrap();
        assert!(run(&e, json!({"path": "/usr/bin/curl"})).0);
        assert!(!run(&e, json!({"path": "/usr/sbin/curl"})).0);

        let e = string_equals(&glob, &path, &mut state).unwrap();
        assert!(run(&e, json!({"path": "/usr/bin/curl"})).0);

        assert_eq!(
            state.field_values("path"),
            [FieldValue::new("/usr/bin/*", FieldValueType::Glob)]
        );
    }

    #[test]
    fn test_matcher_literals_cost_more() {
        let mut state = State::new();
        let path = StringEvaluator::event_field("path");

        let e = string_equals(&path, &lit("/bin/sh"), &mut state).unwrap();
        assert_eq!(e.weight, path.weight);

        let glob = lit("/usr/*").with_value_type(FieldValueType::Glob);
        let e = string_equals(&path, &glob, &mut state).unwrap();
        assert_eq!(e.weight, path.weight + PATTERN_WEIGHT);
        let e = string_equals(&glob, &path, &mut state).unwrap();
        assert_eq!(e.weight, path.weight + PATTERN_WEIGHT);

        let re = lit("^/s?bin/").with_value_type(FieldValueType::Regexp);
        let e = string_equals(&path, &re, &mut state).unwrap();
        assert_eq!(e.weight, path.weight + REGEXP_WEIGHT);
        assert!(run(&e, json!({"path": "/sbin/init"})).0);
    }

    #[test]
    fn test_string_equals_case_insensitive_field() {
        let mut state = State::new();
        let opts = StringCmpOpts {
            case_insensitive: true,
            ..Default::default()
        };
        let name = StringEvaluator::event_field("name").with_string_cmp_opts(opts);
        let e = string_equals(&name, &lit("Bash"), &mut state).unwrap();
        assert!(run(&e, json!({"name": "BASH"})).0);

        let other = StringEvaluator::event_field("other");
        let e = string_equals(&name, &other, &mut state).unwrap();
        assert!(run(&e, json!({"name": "x", "other": "X"})).0);
    }

    #[test]
    fn test_string_equals_bad_regex_fails() {
        let mut state = State::new();
        let re = lit("[oops").with_value_type(FieldValueType::Regexp);
        let err = string_equals(&StringEvaluator::event_field("p"), &re, &mut state).unwrap_err();
        assert!(matches!(err, crate::EvalError::InvalidRegex { .. }));
    }

    #[test]
    fn test_string_equals_reports_both_sides() {
        let mut state = State::new();
        let path = StringEvaluator::event_field("path").with_offset(0);
        let e = string_equals(&path, &lit("/bin/sh").with_offset(8), &mut state).unwrap();

        let event = json!({"path": "/bin/sh"});
        let mut ctx = Context::from_value(&event);
        assert!(e.eval(&mut ctx));
        let m = &ctx.matching_sub_exprs()[0];
        assert_eq!(m.a, MatchingValue::new(Some("path"), "/bin/sh", 0));
        assert_eq!(m.b, MatchingValue::new(None, "/bin/sh", 8));
    }

    #[test]
    fn test_string_array_contains() {
        let mut state = State::new();
        let name = StringEvaluator::event_field("name");
        let arr = StringArrayEvaluator::from_value(vec!["sh".into(), "bash".into()]);
        let e = string_array_contains(&name, &arr, &mut state).unwrap();
        assert_eq!(e.weight, name.weight + 2 * IN_ARRAY_WEIGHT);
        assert!(run(&e, json!({"name": "bash"})).0);
        assert!(!run(&e, json!({"name": "zsh"})).0);
        assert_eq!(state.field_values("name").len(), 2);

        // literal pattern against a dynamic array
        let args = StringArrayEvaluator::event_field("args");
        let pat = lit("--*").with_value_type(FieldValueType::Pattern);
        let e = string_array_contains(&pat, &args, &mut state).unwrap();
        assert!(run(&e, json!({"args": ["-c", "--verbose"]})).0);
        assert!(!run(&e, json!({"args": ["-c"]})).0);
    }

    #[test]
    fn test_string_values_contains() {
        let mut state = State::new();
        let values = StringValuesEvaluator::from_literals([
            ("a", FieldValueType::Scalar),
            ("b", FieldValueType::Scalar),
            ("c*", FieldValueType::Glob),
        ]);
        let field = StringEvaluator::event_field("f");
        let e = string_values_contains(&field, &values, &mut state).unwrap();
        assert_eq!(e.weight, field.weight + 3 * IN_ARRAY_WEIGHT + PATTERN_WEIGHT);
        assert_eq!(state.field_values("f").len(), 3);

        let event = json!({"f": "cat"});
        let mut ctx = Context::from_value(&event);
        assert!(e.eval(&mut ctx));
        assert_eq!(ctx.matching_sub_exprs()[0].b.value, json!("c*"));
        assert!(!run(&e, json!({"f": "z"})).0);

        let e = string_values_contains(&lit("b"), &values, &mut state).unwrap();
        assert_eq!(e.static_value(), Some(&true));
    }

    #[test]
    fn test_string_values_contains_propagates_compile_error() {
        let mut state = State::new();
        let values = StringValuesEvaluator::from_literals([("/etc/**", FieldValueType::Pattern)]);
        let err = string_values_contains(&StringEvaluator::event_field("f"), &values, &mut state)
            .unwrap_err();
        assert!(matches!(err, crate::EvalError::InvalidPattern { .. }));
    }

    #[test]
    fn dynamic_value_set_must_arrive_compiled() {
        let mut state = State::new();
        let field = StringEvaluator::event_field("f");
        let raw: StringValues = ["a", "b"].into_iter().collect();

        let mut compiled = raw.clone();
        compiled.compile(StringCmpOpts::default()).unwrap();
        let dynamic = StringValuesEvaluator::from_fn(move |_| compiled.clone());
        let e = string_values_contains(&field, &dynamic, &mut state).unwrap();
        assert!(run(&e, json!({"f": "b"})).0);

        // sets are not compiled on the hot path
        let dynamic = StringValuesEvaluator::from_fn(move |_| raw.clone());
        let e = string_values_contains(&field, &dynamic, &mut state).unwrap();
        assert!(!run(&e, json!({"f": "b"})).0);
    }

    #[test]
    fn test_string_array_matches() {
        let mut state = State::new();
        let values = StringValuesEvaluator::from_literals([("(curl|wget)", FieldValueType::Regexp)]);
        let args = StringArrayEvaluator::event_field("args");
        let e = string_array_matches(&args, &values, &mut state).unwrap();
        assert!(run(&e, json!({"args": ["sh", "-c", "wget http://x"]})).0);
        assert!(!run(&e, json!({"args": ["ls"]})).0);
    }

    #[test]
    fn test_int_comparisons() {
        let mut state = State::new();
        let uid = IntEvaluator::event_field("uid");
        let zero = IntEvaluator::from_value(0);
        let event = json!({"uid": 0});

        assert!(run(&int_equals(&uid, &zero, &mut state).unwrap(), event.clone()).0);
        assert!(!run(&greater_than(&uid, &zero, &mut state).unwrap(), event.clone()).0);
        assert!(run(&greater_or_equal_than(&uid, &zero, &mut state).unwrap(), event.clone()).0);
        assert!(!run(&lesser_than(&uid, &zero, &mut state).unwrap(), event.clone()).0);
        assert!(run(&lesser_or_equal_than(&uid, &zero, &mut state).unwrap(), event.clone()).0);
        assert!(run(&lesser_than(&zero, &IntEvaluator::event_field("n"), &mut state).unwrap(), json!({"n": 1})).0);
        assert_eq!(state.field_values("uid"), [FieldValue::scalar(0i64)]);
    }

    #[test]
    fn test_registry_type_mismatch_fails_operator() {
        let mut state = State::new();
        let uid = IntEvaluator::event_field("uid");
        int_equals(&uid, &IntEvaluator::from_value(0), &mut state).unwrap();

        let as_str = StringEvaluator::event_field("uid");
        let err = string_equals(&as_str, &lit("root"), &mut state).unwrap_err();
        assert!(matches!(err, crate::EvalError::FieldValueType { .. }));
    }

    #[test]
    fn test_int_array_ops() {
        let mut state = State::new();
        let gids = IntArrayEvaluator::event_field("gids");
        let wanted = IntArrayEvaluator::from_value(vec![0, 4]);
        let e = int_array_matches(&gids, &wanted, &mut state).unwrap();
        assert!(run(&e, json!({"gids": [27, 4]})).0);
        assert!(!run(&e, json!({"gids": [27]})).0);

        let e = int_array_contains(&IntEvaluator::event_field("uid"), &wanted, &mut state).unwrap();
        assert!(run(&e, json!({"uid": 4})).0);
        assert!(!run(&e, json!({"uid": 5})).0);
    }

    #[test]
    fn test_bool_ops() {
        let mut state = State::new();
        let e = array_bool_contains(
            &flag("b"),
            &BoolArrayEvaluator::from_value(vec![true]),
            &mut state,
        )
        .unwrap();
        assert!(run(&e, json!({"b": true})).0);
        assert!(!run(&e, json!({"b": false})).0);

        let e = bool_equals(&flag("b"), &BoolEvaluator::from_value(false), &mut state).unwrap();
        assert!(run(&e, json!({"b": false})).0);
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_cidr_equals() {
        let mut state = State::new();
        let e = cidr_equals(
            &CidrEvaluator::event_field("net"),
            &CidrEvaluator::from_value(net("10.0.0.0/8")),
            &mut state,
        )
        .unwrap();
        assert!(run(&e, json!({"net": "10.0.0.0/8"})).0);
        assert!(!run(&e, json!({"net": "10.0.0.0/16"})).0);
        assert!(!run(&e, json!({"net": "10.0.0.1"})).0);
    }

    #[test]
    fn test_cidr_values_contains() {
        let mut state = State::new();
        let set: CidrValues = [net("10.0.0.0/8"), net("192.168.0.0/16")].into_iter().collect();
        let e = cidr_values_contains(
            &CidrEvaluator::event_field("ip"),
            &CidrValuesEvaluator::from_value(set),
            &mut state,
        )
        .unwrap();
        assert!(run(&e, json!({"ip": "192.168.1.1"})).0);
        assert!(!run(&e, json!({"ip": "172.16.0.1"})).0);
        assert_eq!(state.field_values("ip").len(), 2);
    }

    #[test]
    fn test_cidr_array_any_vs_all() {
        let mut state = State::new();
        let set: CidrValues = [net("10.0.0.0/24")].into_iter().collect();
        let b = CidrValuesEvaluator::from_value(set);
        let a = CidrArrayEvaluator::from_value(vec![net("10.0.0.0/24"), net("192.168.0.0/16")]);

        let any = cidr_array_matches(&a, &b, &mut state).unwrap();
        let all = cidr_array_matches_all(&a, &b, &mut state).unwrap();
        assert_eq!(any.static_value(), Some(&true));
        assert_eq!(all.static_value(), Some(&false));

        let dynamic = CidrArrayEvaluator::event_field("ips");
        let all = cidr_array_matches_all(&dynamic, &b, &mut state).unwrap();
        assert!(run(&all, json!({"ips": ["10.0.0.1", "10.0.0.2"]})).0);
        assert!(!run(&all, json!({"ips": ["10.0.0.1", "8.8.8.8"]})).0);
    }

    #[test]
    fn test_cidr_array_contains_and_evaluator() {
        let mut state = State::new();
        let arr = CidrArrayEvaluator::from_value(vec![net("10.0.0.0/8")]);
        let e = cidr_array_contains(&CidrEvaluator::event_field("ip"), &arr, &mut state).unwrap();
        assert!(run(&e, json!({"ip": "10.1.1.1"})).0);
        assert!(!run(&e, json!({"ip": "11.1.1.1"})).0);

        let e = cidr_array_matches_cidr_evaluator(
            &CidrArrayEvaluator::event_field("nets"),
            &CidrEvaluator::from_value(net("172.16.5.4/32")),
            &state,
        )
        .unwrap();
        assert!(run(&e, json!({"nets": ["10.0.0.0/8", "172.16.0.0/12"]})).0);
        assert!(!run(&e, json!({"nets": ["10.0.0.0/8"]})).0);
    }

    #[test]
    fn test_arithm_determinism() {
        let state = State::with_field("a");
        let a = IntEvaluator::event_field("a");
        let b = IntEvaluator::event_field("b");
        let lit = IntEvaluator::from_value(1);
        assert!(is_arithm_deterministic(&a, &lit, &state));
        assert!(!is_arithm_deterministic(&b, &lit, &state));
        // a foreign field spoils determinism even with a deterministic side
        assert!(!is_arithm_deterministic(&a, &b, &state));
        assert!(!is_arithm_deterministic(&a, &lit, &State::new()));
    }
}

#![allow(dead_code)]

use policy_eval::operators::{and, int_array_contains, string_equals};
use policy_eval::{
    BoolEvaluator, Context, FieldValueType, IntArrayEvaluator, IntEvaluator, MatchingSubExpr,
    State, StringEvaluator,
};
use serde_json::Value;

/// String literal with the given type tag.
pub fn lit(value: &str, value_type: FieldValueType) -> StringEvaluator {
    StringEvaluator::from_value(value.to_string()).with_value_type(value_type)
}

pub fn scalar(value: &str) -> StringEvaluator {
    lit(value, FieldValueType::Scalar)
}

/// `a.path == <path> && a.uid in [uids]`
pub fn path_uid_rule(state: &mut State, path: &str, uids: &[i64]) -> BoolEvaluator {
    let path = string_equals(
        &StringEvaluator::event_field("a.path").with_offset(0),
        &scalar(path).with_offset(10),
        state,
    )
    .unwrap();
    let uid = int_array_contains(
        &IntEvaluator::event_field("a.uid").with_offset(24),
        &IntArrayEvaluator::from_value(uids.to_vec()).with_offset(33),
        state,
    )
    .unwrap();
    and(&path, &uid, state).unwrap()
}

/// Run `rule` against `event_json`, returning the result and the reports.
pub fn eval(rule: &BoolEvaluator, event_json: Value) -> (bool, Vec<MatchingSubExpr>) {
    let mut ctx = Context::from_value(&event_json);
    let res = rule.eval(&mut ctx);
    (res, ctx.take_matching_sub_exprs())
}

//! Event wrapper with dot-notation field access.
//!
//! Leaf evaluators built by [`crate::evaluator`] read event fields through
//! this type. Field names such as `process.file.path` are resolved against
//! nested JSON objects, with a flat key of the same name taking precedence.

use std::net::IpAddr;

use ipnet::IpNet;
use serde_json::Value;

/// A borrowed JSON event.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    inner: &'a Value,
}

impl<'a> Event<'a> {
    pub fn from_value(value: &'a Value) -> Self {
        Event { inner: value }
    }

    /// Look up a field, flat key first, then dot-separated traversal.
    pub fn get_field(&self, path: &str) -> Option<&'a Value> {
        if let Some(obj) = self.inner.as_object()
            && let Some(v) = obj.get(path)
        {
            return Some(v);
        }

        if path.contains('.') {
            return traverse(self.inner, path.split('.'));
        }

        None
    }

    pub fn get_str(&self, path: &str) -> Option<&'a str> {
        self.get_field(path).and_then(Value::as_str)
    }

    /// Integer field; numeric strings are accepted.
    pub fn get_int(&self, path: &str) -> Option<i64> {
        match self.get_field(path)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_field(path).and_then(Value::as_bool)
    }

    /// String array field; a lone string is read as a one-element array.
    pub fn get_str_array(&self, path: &str) -> Vec<String> {
        match self.get_field(path) {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn get_int_array(&self, path: &str) -> Vec<i64> {
        match self.get_field(path) {
            Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_i64).collect(),
            Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn get_bool_array(&self, path: &str) -> Vec<bool> {
        match self.get_field(path) {
            Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_bool).collect(),
            Some(Value::Bool(b)) => vec![*b],
            _ => Vec::new(),
        }
    }

    /// Address or range field, e.g. `"10.0.0.1"` or `"10.0.0.0/8"`.
    pub fn get_ipnet(&self, path: &str) -> Option<IpNet> {
        self.get_str(path).and_then(parse_net)
    }

    pub fn get_ipnet_array(&self, path: &str) -> Vec<IpNet> {
        match self.get_field(path) {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(Value::as_str)
                .filter_map(parse_net)
                .collect(),
            Some(Value::String(s)) => parse_net(s).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_net(s: &str) -> Option<IpNet> {
    s.parse::<IpNet>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(IpNet::from))
}

/// Walk `parts` down from `current`. Arrays are searched element by element
/// and the first one resolving the rest of the path wins.
fn traverse<'a, 'p>(
    current: &'a Value,
    mut parts: impl Iterator<Item = &'p str> + Clone,
) -> Option<&'a Value> {
    let Some(head) = parts.clone().next() else {
        return Some(current);
    };

    match current {
        Value::Object(map) => {
            parts.next();
            traverse(map.get(head)?, parts)
        }
        Value::Array(arr) => arr.iter().find_map(|item| traverse(item, parts.clone())),
        _ => None,
    }
}

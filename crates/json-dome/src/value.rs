//! Helpers over `serde_json::Value` used by the operation set.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Number, Value};

/// The runtime shape of a slot, including the absent case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Absent,
    Null,
    Boolean,
    Number,
    String,
    Sequence,
    Map,
}

impl ValueKind {
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => ValueKind::Absent,
            Some(Value::Null) => ValueKind::Null,
            Some(Value::Bool(_)) => ValueKind::Boolean,
            Some(Value::Number(_)) => ValueKind::Number,
            Some(Value::String(_)) => ValueKind::String,
            Some(Value::Array(_)) => ValueKind::Sequence,
            Some(Value::Object(_)) => ValueKind::Map,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Absent => "absent",
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Map => "map",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ValueKind::Sequence | ValueKind::Map)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deep equality with numbers compared by numeric value, so `1 == 1.0`.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(x), Some(y)) if x == y)
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}

/// `a + b`, integral when both sides are integers and the sum fits `i64`.
///
/// Returns `None` when the result is not a finite number.
pub fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Some(Number::from(sum));
        }
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?)
}

/// `a - b`, with the same integer rules as [`add_numbers`].
pub fn sub_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(diff) = x.checked_sub(y) {
            return Some(Number::from(diff));
        }
    }
    Number::from_f64(a.as_f64()? - b.as_f64()?)
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used by `sort` when no comparator is given.
///
/// null < boolean < number < string < sequence < map. Numbers compare
/// numerically, strings lexicographically, sequences element-wise and maps
/// by size.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                match compare_values(x, y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Object(xs), Value::Object(ys)) => xs.len().cmp(&ys.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Text of a scalar when concatenated onto a string; `None` for containers.
pub fn concat_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

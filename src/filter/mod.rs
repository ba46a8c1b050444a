//! Subscription filters and event matching.
//!
//! Filter values are compared against event payload attributes by their
//! string representation rather than by strict JSON type: a filter of
//! `{"build": 1}` matches a payload carrying `{"build": "1"}` and vice versa.
//! This is an intentional compatibility choice, since gateway payloads mix
//! numeric and string encodings of the same attribute. It is not a bug.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved attribute carrying the channel name in configuration records and events
pub const CHANNEL_KEY: &str = "jenkins_channel";

/// Attribute constraints an event payload must satisfy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Map<String, Value>);

impl Filter {
    /// Create an empty filter (matches every payload)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute constraint
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy of this filter with the channel name injected under [`CHANNEL_KEY`].
    ///
    /// This is the configuration record sent to the gateway.
    pub fn with_channel(&self, channel: &str) -> Filter {
        let mut record = self.clone();
        record.insert(CHANNEL_KEY, channel);
        record
    }

    /// Check whether `payload` satisfies every attribute of this filter
    pub fn matches(&self, payload: &Value) -> bool {
        matches(payload, self)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Filter {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Match a payload against a filter.
///
/// True iff every key in `filter` exists in `payload` with an equal string
/// representation. An empty filter matches any payload; a non-object payload
/// only matches the empty filter.
pub fn matches(payload: &Value, filter: &Filter) -> bool {
    if filter.is_empty() {
        return true;
    }

    let Some(attributes) = payload.as_object() else {
        return false;
    };

    filter.iter().all(|(key, expected)| {
        attributes
            .get(key)
            .is_some_and(|actual| coerce_to_string(actual) == coerce_to_string(expected))
    })
}

/// String representation used for filter comparison
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn number_to_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => float_to_string(f),
        None => n.to_string(),
    }
}

/// Shortest round-trip rendering of a float in the notation event producers use:
/// plain digits for decimal exponents in `-7..21`, `1e+21` / `1e-7` style outside.
/// Integral floats render without a fractional part (`2.0` -> `"2"`).
fn float_to_string(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e2"
    let scientific = format!("{:e}", f.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return f.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return f.to_string();
    };

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let len = digits.len() as i32;
    // Position of the decimal point relative to the first digit
    let point = exponent + 1;

    let body = if len <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - len) as usize))
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat(-point as usize), digits)
    } else {
        let (first, rest) = digits.split_at(1);
        let sign = if exponent >= 0 { '+' } else { '-' };
        if rest.is_empty() {
            format!("{}e{}{}", first, sign, exponent.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, sign, exponent.abs())
        }
    };

    if f < 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

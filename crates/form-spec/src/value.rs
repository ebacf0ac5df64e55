//! Helpers for reading declaration values, which travel as JSON.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Absent, `null`, empty string, or `false`.
pub fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Bool(flag)) => !flag,
        Some(_) => false,
    }
}

/// Falsy, or a container with nothing meaningful inside. Used by the
/// built-in required check, so a composite value like an empty name object
/// counts as missing.
pub fn is_empty(value: Option<&Value>) -> bool {
    if is_falsy(value) {
        return true;
    }
    match value {
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.values().all(|member| is_empty(Some(member))),
        _ => false,
    }
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Numbers and numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Text form used by pattern matching; numbers match by their literal digits.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Calendar day of a date value. Accepts `YYYY-MM-DD`, RFC 3339 timestamps,
/// and naive `YYYY-MM-DDTHH:MM:SS` timestamps; time of day is discarded.
pub fn as_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.date_naive());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|timestamp| timestamp.date())
}

/// Resolves a dotted id against a keyed store. An exact key wins; otherwise
/// the longest stored prefix holding an object is descended with the remaining
/// segments, so `applicant.name.firstname` reads into the `applicant.name` value.
pub fn lookup_dotted<'a, F>(id: &str, get: F) -> Option<&'a Value>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    if let Some(value) = get(id) {
        return Some(value);
    }
    let mut split = id.len();
    while let Some(dot) = id[..split].rfind('.') {
        if let Some(base) = get(&id[..dot]) {
            return descend(base, &id[dot + 1..]);
        }
        split = dot;
    }
    None
}

pub(crate) fn descend<'a>(base: &'a Value, rest: &str) -> Option<&'a Value> {
    rest.split('.')
        .try_fold(base, |current, segment| current.as_object()?.get(segment))
}

/// Writes `value` at the dotted `rest` path inside `base`. Non-object values
/// met on the way are replaced by objects.
pub(crate) fn assign(base: &mut Value, rest: &str, value: Value) {
    let mut current = base;
    for segment in rest.split('.') {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map.entry(segment).or_insert(Value::Null);
    }
    *current = value;
}

/// Removes the member at the dotted `rest` path inside `base`.
pub(crate) fn remove(base: &mut Value, rest: &str) -> Option<Value> {
    let (parent, leaf) = match rest.rsplit_once('.') {
        Some((path, leaf)) => (
            path.split('.')
                .try_fold(base, |current, segment| current.as_object_mut()?.get_mut(segment))?,
            leaf,
        ),
        None => (base, rest),
    };
    parent.as_object_mut()?.remove(leaf)
}

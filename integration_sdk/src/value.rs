use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A single value pulled from a monitored service, before translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Map(RawBag),
    List(Vec<RawValue>),
}

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Int(i) => Some(*i as f64),
            RawValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, RawValue::Int(_) | RawValue::Float(_))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, RawValue::Map(_) | RawValue::List(_))
    }

    /// Replaces NaN and infinite floats, at any depth, with their text form.
    /// JSON has no encoding for them.
    pub fn into_finite(self) -> Self {
        match self {
            RawValue::Float(f) if !f.is_finite() => RawValue::String(f.to_string()),
            RawValue::Map(bag) => RawValue::Map(
                bag.values
                    .into_iter()
                    .map(|(key, value)| (key, value.into_finite()))
                    .collect(),
            ),
            RawValue::List(items) => {
                RawValue::List(items.into_iter().map(RawValue::into_finite).collect())
            }
            other => other,
        }
    }

    /// Converts a decoded JSON value. `null` has no raw counterpart and maps to `None`;
    /// `null` entries inside objects and arrays are dropped.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(RawValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(RawValue::Int(i)),
                None => n.as_f64().map(RawValue::Float),
            },
            serde_json::Value::String(s) => Some(RawValue::String(s.clone())),
            serde_json::Value::Array(items) => Some(RawValue::List(
                items.iter().filter_map(RawValue::from_json).collect(),
            )),
            serde_json::Value::Object(map) => Some(RawValue::Map(RawBag::from_json_object(map))),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::String(s) => f.write_str(s),
            RawValue::Map(_) | RawValue::List(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::String(value)
    }
}

impl From<RawBag> for RawValue {
    fn from(value: RawBag) -> Self {
        RawValue::Map(value)
    }
}

/// Key/value snapshot produced by a data-acquisition step.
///
/// The typed accessors return `None` both for a missing key and for a value of
/// the wrong type, so derivation functions built on them never panic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawBag {
    values: BTreeMap<String, RawValue>,
}

impl RawBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        map.iter()
            .filter_map(|(key, value)| RawValue::from_json(value).map(|v| (key.clone(), v)))
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawValue>) -> Option<RawValue> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.values.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            RawValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            RawValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer or float, widened to `f64`.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.values.get(key)?.as_f64()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            RawValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<RawValue>> Extend<(K, V)> for RawBag {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.values.insert(k.into(), v.into());
        }
    }
}

impl<'a> IntoIterator for &'a RawBag {
    type Item = (&'a String, &'a RawValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, RawValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Converts a raw string into the most specific value it represents:
/// integer, then finite float, then boolean literal, then the string itself.
pub fn coerce(raw: &str) -> RawValue {
    if let Ok(i) = raw.parse::<i64>() {
        return RawValue::Int(i);
    }

    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return RawValue::Float(f);
        }
    }

    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => RawValue::Bool(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => RawValue::Bool(false),
        _ => RawValue::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_coerce_picks_most_specific_type() {
        assert_eq!(coerce("10"), RawValue::Int(10));
        assert_eq!(coerce("-42"), RawValue::Int(-42));
        assert_eq!(coerce("0.12"), RawValue::Float(0.12));
        assert_eq!(coerce(".00212862"), RawValue::Float(0.00212862));
        assert_eq!(coerce("true"), RawValue::Bool(true));
        assert_eq!(coerce("False"), RawValue::Bool(false));
        assert_eq!(coerce("x"), RawValue::String("x".to_string()));
        assert_eq!(coerce("test string"), RawValue::String("test string".to_string()));
    }

    #[test]
    fn test_coerce_keeps_unrepresentable_numbers_as_strings() {
        assert_eq!(coerce("NaN"), RawValue::String("NaN".to_string()));
        assert_eq!(coerce("inf"), RawValue::String("inf".to_string()));
        assert_eq!(coerce("yes"), RawValue::String("yes".to_string()));
    }

    #[test]
    fn test_coerce_overflowing_integer_becomes_float() {
        assert_eq!(coerce("99999999999999999999"), RawValue::Float(1e20));
    }

    #[test]
    fn test_into_finite_replaces_nested_non_finite_floats() {
        let nested: RawBag = [("ratio", RawValue::Float(f64::NAN))].into_iter().collect();
        let value = RawValue::List(vec![
            RawValue::Float(f64::INFINITY),
            RawValue::Float(1.5),
            RawValue::Map(nested),
        ]);

        let finite = value.into_finite();

        let RawValue::List(items) = &finite else {
            panic!("expected a list");
        };
        assert_eq!(items[0], RawValue::from("inf"));
        assert_eq!(items[1], RawValue::Float(1.5));
        let RawValue::Map(bag) = &items[2] else {
            panic!("expected a nested map");
        };
        assert_eq!(bag.get_str("ratio"), Some("NaN"));
        assert!(!serde_json::to_string(&finite).unwrap().contains("null"));
    }

    #[test]
    fn test_typed_accessors_fail_closed() {
        let bag: RawBag = [
            ("int", RawValue::Int(3)),
            ("float", RawValue::Float(1.5)),
            ("text", RawValue::from("abc")),
        ]
        .into_iter()
        .collect();

        assert_eq!(bag.get_int("int"), Some(3));
        assert_eq!(bag.get_int("float"), None);
        assert_eq!(bag.get_int("missing"), None);
        assert_eq!(bag.get_number("int"), Some(3.0));
        assert_eq!(bag.get_number("text"), None);
        assert_eq!(bag.get_str("text"), Some("abc"));
        assert_eq!(bag.get_str("int"), None);
    }

    #[test]
    fn test_from_json_drops_nulls() {
        let json = serde_json::json!({
            "count": 3,
            "ratio": 0.5,
            "name": "nginx",
            "missing": null,
            "nested": {"ok": true, "gone": null},
        });
        let serde_json::Value::Object(map) = json else {
            panic!("expected an object");
        };

        let bag = RawBag::from_json_object(&map);

        assert_eq!(bag.len(), 4);
        assert_eq!(bag.get_int("count"), Some(3));
        assert_eq!(bag.get_float("ratio"), Some(0.5));
        let Some(RawValue::Map(nested)) = bag.get("nested") else {
            panic!("expected a nested map");
        };
        assert_eq!(nested.len(), 1);
    }

    proptest! {
        #[test]
        fn coerce_never_panics(s in ".*") {
            let _ = coerce(&s);
        }

        #[test]
        fn coerce_round_trips_integers(i in any::<i64>()) {
            prop_assert_eq!(coerce(&i.to_string()), RawValue::Int(i));
        }
    }
}

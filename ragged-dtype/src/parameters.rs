use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};

/// Parameters whose values change the type of a node: two nodes that disagree on any of these
/// can never be merged into one.
pub const TYPE_PARAMETERS: [&str; 2] = ["__array__", "__record__"];

/// Free-form metadata attached to a layout node.
///
/// Keys are strings, values are arbitrary JSON. `__array__` marks list-of-char nodes as
/// strings (`"string"`, `"bytestring"`), `__record__` names a record type, `__doc__` carries
/// documentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    /// No parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a parameter, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a parameter.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a parameter whose value is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// `__array__` is `"string"` or `"bytestring"`.
    pub fn is_string_like(&self) -> bool {
        matches!(self.get_str("__array__"), Some("string" | "bytestring"))
    }

    /// `__array__` is `"char"` or `"byte"`, the leaf of a string.
    pub fn is_char_like(&self) -> bool {
        matches!(self.get_str("__array__"), Some("char" | "byte"))
    }

    /// Whether the type-defining parameters agree. Other keys are ignored.
    pub fn type_parameters_equal(&self, other: &Parameters) -> bool {
        TYPE_PARAMETERS
            .iter()
            .all(|key| self.get(key) == other.get(key))
    }

    /// Parameters of the result of merging a node carrying `self` with one carrying `other`.
    ///
    /// Identical parameters survive whole. Otherwise only the type-defining keys on which
    /// both sides agree survive.
    pub fn merge(&self, other: &Parameters) -> Parameters {
        if self == other {
            return self.clone();
        }
        Parameters(
            TYPE_PARAMETERS
                .iter()
                .filter_map(|key| match (self.get(key), other.get(key)) {
                    (Some(a), Some(b)) if a == b => Some(((*key).to_string(), a.clone())),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Every key of `self` and `other`. Where both define a key, `self` wins.
    pub fn union(&self, other: &Parameters) -> Parameters {
        let mut out = other.0.clone();
        out.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Parameters(out)
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Read back a JSON object produced by [`Parameters::to_json`].
    pub fn from_json(map: &Map<String, Value>) -> Self {
        Parameters(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Parameters(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Display for Parameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_keeps_agreeing_type_parameters() {
        let plain_isdoc = Parameters::empty().with("__doc__", "This is a number.");
        let array_plain = Parameters::empty().with("__array__", "zoinks");
        let array_isdoc = array_plain.clone().with("__doc__", "This is a zoink.");

        assert!(Parameters::empty().merge(&plain_isdoc).is_empty());
        assert!(plain_isdoc.merge(&array_isdoc).is_empty());
        assert_eq!(array_plain.merge(&array_isdoc), array_plain);
        assert_eq!(array_isdoc.merge(&array_plain), array_plain);
    }

    #[test]
    fn merge_keeps_identical_parameters_whole() {
        let plain_isdoc = Parameters::empty().with("__doc__", "This is a zoink.");
        let array_isdoc = Parameters::empty()
            .with("__array__", "zoinks")
            .with("__doc__", "This is a zoink.");

        assert_eq!(plain_isdoc.merge(&plain_isdoc), plain_isdoc);
        assert_eq!(array_isdoc.merge(&array_isdoc), array_isdoc);
        assert_eq!(
            array_isdoc.merge(&array_isdoc).get_str("__doc__"),
            Some("This is a zoink.")
        );
    }

    #[test]
    fn type_parameters_decide_compatibility() {
        let a = Parameters::empty().with("__array__", "string");
        let b = Parameters::empty().with("__doc__", json!({"nested": [1, 2]}));
        assert!(!a.type_parameters_equal(&b));
        assert!(b.type_parameters_equal(&Parameters::empty()));
        assert!(a.is_string_like());
        assert!(!b.is_string_like());
    }

    #[test]
    fn union_prefers_outer_values() {
        let outer = Parameters::empty().with("__doc__", "outer");
        let inner = Parameters::empty()
            .with("__doc__", "inner")
            .with("__array__", "string");
        let merged = outer.union(&inner);
        assert_eq!(merged.get_str("__doc__"), Some("outer"));
        assert!(merged.is_string_like());
    }
}

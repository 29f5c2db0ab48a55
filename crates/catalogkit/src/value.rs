//! Property-tree values for request and action templates.
//!
//! Templates arrive as arbitrary JSON. Rather than walking `serde_json::Value`
//! directly, they are lifted into [`TemplateValue`], which only distinguishes
//! the three shapes the merger cares about: scalars, mappings (components and
//! their property maps) and sequences.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A nested property map, ordered by key.
pub type PropertyMap = BTreeMap<String, TemplateValue>;

/// A leaf value in a template or in user configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Whether this scalar is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert this value to the type of `existing` when it is a string that
    /// parses as that type. Anything else is returned unchanged.
    ///
    /// Configuration files tend to carry every value as a string, while the
    /// remote template types `cpu` or `memory` as numbers.
    #[must_use]
    pub fn coerce_like(&self, existing: &Scalar) -> Scalar {
        let Self::String(raw) = self else {
            return self.clone();
        };
        let trimmed = raw.trim();

        match existing {
            Self::Number(_) => parse_number(trimmed)
                .map(Self::Number)
                .unwrap_or_else(|| self.clone()),
            Self::Bool(_) => match trimmed {
                "true" => Self::Bool(true),
                "false" => Self::Bool(false),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Some(Number::from(u));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Number(Number::from(n))
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Self::Number(Number::from(n))
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl TryFrom<Value> for Scalar {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => Ok(Self::Number(n)),
            Value::String(s) => Ok(Self::String(s)),
            Value::Array(_) | Value::Object(_) => {
                Err("expected a scalar (string, number, bool or null)".to_string())
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::String(s) => Value::String(s),
        }
    }
}

/// A node in a template's property tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum TemplateValue {
    Scalar(Scalar),
    Mapping(PropertyMap),
    Sequence(Vec<TemplateValue>),
}

impl TemplateValue {
    /// An empty mapping.
    pub fn mapping() -> Self {
        Self::Mapping(PropertyMap::new())
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    pub fn as_mapping(&self) -> Option<&PropertyMap> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut PropertyMap> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// Look up a key when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Look up a string scalar under `key` when this value is a mapping.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Self::Scalar(Scalar::String(s))) => Some(s),
            _ => None,
        }
    }
}

impl From<Scalar> for TemplateValue {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<PropertyMap> for TemplateValue {
    fn from(map: PropertyMap) -> Self {
        Self::Mapping(map)
    }
}

impl From<Value> for TemplateValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Array(items) => Self::Sequence(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<TemplateValue> for Value {
    fn from(value: TemplateValue) -> Self {
        match value {
            TemplateValue::Scalar(scalar) => scalar.into(),
            TemplateValue::Sequence(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            TemplateValue::Mapping(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_value_from_json() {
        let value = TemplateValue::from(json!({
            "machine": {"data": {"cpu": 1, "tags": ["a", "b"]}},
            "_leaseDays": null
        }));

        let map = value.as_mapping().unwrap();
        assert!(map["machine"].is_mapping());
        assert_eq!(map["_leaseDays"], TemplateValue::Scalar(Scalar::Null));

        let data = map["machine"].get("data").unwrap();
        assert_eq!(data.get("cpu"), Some(&TemplateValue::Scalar(Scalar::from(1))));
        assert!(matches!(data.get("tags"), Some(TemplateValue::Sequence(items)) if items.len() == 2));
    }

    #[test]
    fn test_template_value_back_to_json() {
        let original = json!({"a": {"b": [1, true, "x"]}, "c": null});
        let value = TemplateValue::from(original.clone());
        assert_eq!(Value::from(value), original);
    }

    #[test]
    fn test_scalar_rejects_structures() {
        assert!(Scalar::try_from(json!({"a": 1})).is_err());
        assert!(Scalar::try_from(json!([1])).is_err());
        assert_eq!(Scalar::try_from(json!("x")).unwrap(), Scalar::from("x"));
    }

    #[test]
    fn test_coerce_like_number() {
        let existing = Scalar::from(1);
        assert_eq!(Scalar::from("4").coerce_like(&existing), Scalar::from(4));
        assert_eq!(
            Scalar::from("2.5").coerce_like(&existing),
            Scalar::Number(Number::from_f64(2.5).unwrap())
        );
        assert_eq!(
            Scalar::from("lots").coerce_like(&existing),
            Scalar::from("lots")
        );
    }

    #[test]
    fn test_coerce_like_bool_and_string() {
        assert_eq!(
            Scalar::from("true").coerce_like(&Scalar::Bool(false)),
            Scalar::Bool(true)
        );
        assert_eq!(
            Scalar::from("4").coerce_like(&Scalar::from("old")),
            Scalar::from("4")
        );
        assert_eq!(Scalar::from(4).coerce_like(&Scalar::from("old")), Scalar::from(4));
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::from("web").to_string(), "web");
        assert_eq!(Scalar::from(2048).to_string(), "2048");
        assert_eq!(Scalar::Null.to_string(), "null");
    }
}

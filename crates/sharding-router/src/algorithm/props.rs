//! Algorithm properties.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, ShardingError};

/// String-keyed, string-valued algorithm properties.
///
/// Rule files may write property values as any YAML scalar
/// (`sharding-seconds: 3600`); they are normalized to strings on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    fn into_string(self) -> String {
        match self {
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Int(n) => n.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Text(s) => s,
        }
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, ScalarValue>::deserialize(deserializer)?;
        Ok(Properties(
            raw.into_iter()
                .map(|(key, value)| (key, value.into_string()))
                .collect(),
        ))
    }
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Get a required, non-blank property.
    ///
    /// # Errors
    ///
    /// Returns `ShardingError::AlgorithmInit` naming `algorithm_type` when
    /// the property is missing or blank.
    pub fn require(&self, algorithm_type: &str, key: &str) -> Result<&str> {
        match self.get(key).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ShardingError::algorithm_init(
                algorithm_type,
                format!("{} cannot be null", key),
            )),
        }
    }

    /// Parse a required property.
    pub fn parse_required<T>(&self, algorithm_type: &str, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.require(algorithm_type, key)?;
        raw.parse().map_err(|e: T::Err| {
            ShardingError::algorithm_init(
                algorithm_type,
                format!("{} has invalid value '{}': {}", key, raw, e),
            )
        })
    }

    /// Parse an optional property, falling back to `default` when absent.
    pub fn parse_or<T>(&self, algorithm_type: &str, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| {
                ShardingError::algorithm_init(
                    algorithm_type,
                    format!("{} has invalid value '{}': {}", key, raw, e),
                )
            }),
            _ => Ok(default),
        }
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_normalize_to_strings() {
        let props: Properties =
            serde_yaml::from_str("sharding-seconds: 3600\nflag: true\nname: x").unwrap();
        assert_eq!(props.get("sharding-seconds"), Some("3600"));
        assert_eq!(props.get("flag"), Some("true"));
        assert_eq!(props.get("name"), Some("x"));
    }

    #[test]
    fn test_require_and_parse() {
        let props = Properties::new().with("range-lower", 10).with("blank", " ");
        assert_eq!(props.parse_required::<i64>("VOLUME_RANGE", "range-lower").unwrap(), 10);
        assert!(props.require("VOLUME_RANGE", "blank").is_err());

        let err = props.require("VOLUME_RANGE", "range-upper").unwrap_err();
        assert!(err.to_string().contains("range-upper cannot be null"));

        let bad = Properties::new().with("range-lower", "ten");
        assert!(bad.parse_required::<i64>("VOLUME_RANGE", "range-lower").is_err());
        assert_eq!(bad.parse_or::<i64>("VOLUME_RANGE", "absent", 7).unwrap(), 7);
    }
}

//! Attribute maps of document nodes and typed parsing of their values

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The attribute map of a node or mark.
///
/// Editors store whatever they like in here, so every lookup is typed at the
/// call site and a value of the wrong shape reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs(Map<String, Value>);

impl Attrs {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an attribute, returning the map for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Gets the raw value of an attribute.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Gets an attribute parsed as `T`.
    ///
    /// Returns `None` both when the attribute is absent and when it cannot be
    /// parsed as `T`.
    pub fn get<T: AttrParser>(&self, key: &str) -> Option<T> {
        let value = self.raw(key)?;
        let parsed = T::parse_attr(value);
        if parsed.is_none() {
            log::debug!("ignoring malformed attribute {key}: {value}");
        }
        parsed
    }

    /// Gets a non-empty string attribute.
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.raw(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Parses an attribute value into a typed value.
pub trait AttrParser: Sized {
    /// Parses the value, returning `None` when it has the wrong shape.
    fn parse_attr(value: &Value) -> Option<Self>;
}

impl AttrParser for f64 {
    fn parse_attr(value: &Value) -> Option<Self> {
        let n = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => {
                let s = s.trim();
                let s = s.strip_suffix("px").unwrap_or(s).trim_end();
                s.parse::<f64>().ok()?
            }
            _ => return None,
        };
        n.is_finite().then_some(n)
    }
}

impl AttrParser for u32 {
    fn parse_attr(value: &Value) -> Option<Self> {
        let n = f64::parse_attr(value)?;
        (n >= 0.0 && n <= u32::MAX as f64).then(|| n.round() as u32)
    }
}

impl AttrParser for bool {
    fn parse_attr(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse::<bool>().ok(),
            Value::Number(n) => Some(n.as_f64()? != 0.0),
            _ => None,
        }
    }
}

impl<T: AttrParser> AttrParser for Vec<Option<T>> {
    fn parse_attr(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| if item.is_null() { None } else { T::parse_attr(item) })
                    .collect(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_accept_strings_and_px() {
        let attrs = Attrs::new()
            .with("a", 12)
            .with("b", "34px")
            .with("c", " 5.5 ")
            .with("d", "wide");
        assert_eq!(attrs.get::<f64>("a"), Some(12.0));
        assert_eq!(attrs.get::<f64>("b"), Some(34.0));
        assert_eq!(attrs.get::<f64>("c"), Some(5.5));
        assert_eq!(attrs.get::<f64>("d"), None);
        assert_eq!(attrs.get::<u32>("c"), Some(6));
    }

    #[test]
    fn malformed_values_read_as_absent() {
        let attrs = Attrs::new().with("level", json!({"x": 1})).with("n", -3);
        assert_eq!(attrs.get::<u32>("level"), None);
        assert_eq!(attrs.get::<u32>("n"), None);
        assert_eq!(attrs.get::<bool>("missing"), None);
    }

    #[test]
    fn null_is_absent() {
        let attrs = Attrs::new().with("dir", Value::Null);
        assert!(attrs.raw("dir").is_none());
        assert!(attrs.str("dir").is_none());
    }

    #[test]
    fn arrays_keep_holes() {
        let attrs = Attrs::new().with("colwidth", json!([100, null, "50"]));
        assert_eq!(
            attrs.get::<Vec<Option<f64>>>("colwidth"),
            Some(vec![Some(100.0), None, Some(50.0)])
        );
    }
}

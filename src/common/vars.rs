use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// JSON object used for block outputs and resolved inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to any serializable value. Values that fail to serialize become null.
    pub fn set<T: Serialize>(
        &mut self,
        key: &str,
        value: T,
    ) -> &mut Self {
        self.inner.insert(key.to_string(), serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }

    /// Get the value under `key` deserialized into `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_value(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn insert(
        &mut self,
        key: String,
        value: Value,
    ) -> Option<Value> {
        self.inner.insert(key, value)
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.inner.iter()
    }
}

impl From<Value> for Vars {
    /// Objects are taken as-is. Any other value is stored under `value`.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            Value::Null => Self::default(),
            other => {
                let mut vars = Self::default();
                vars.inner.insert("value".to_string(), other);
                vars
            }
        }
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(inner: Map<String, Value>) -> Self {
        Self {
            inner,
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

impl Serialize for Vars {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Vars {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut vars = Vars::new();
        vars.set("count", 42).set("name", "a");
        assert_eq!(vars.get::<i64>("count"), Some(42));
        assert_eq!(vars.get::<String>("name"), Some("a".to_string()));
        assert_eq!(vars.get::<String>("missing"), None);
    }

    #[test]
    fn test_from_non_object_value() {
        let vars = Vars::from(json!(7));
        assert_eq!(vars.get_value("value"), Some(&json!(7)));
        let back: Value = Vars::from(json!({"a": 1})).into();
        assert_eq!(back, json!({"a": 1}));
    }
}

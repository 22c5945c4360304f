use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl VariableType {
    /// Whether `value` is of this type. Null is accepted for every type.
    pub fn accepts(
        &self,
        value: &Value,
    ) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (VariableType::String, Value::String(_)) => true,
            (VariableType::Number, Value::Number(_)) => true,
            (VariableType::Boolean, Value::Bool(_)) => true,
            (VariableType::Array, Value::Array(_)) => true,
            (VariableType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// Workflow-scoped named value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableModel {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

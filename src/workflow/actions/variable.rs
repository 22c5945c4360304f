use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    error::BlockError,
    runtime::Context,
    workflow::actions::{Action, BlockType, parse_config},
};

const VALUE_KEY: &str = "value";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariableOperation {
    #[default]
    Read,
    Set,
}

/// Emits a workflow variable, the input or a constant.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableAction {
    operation: VariableOperation,
    variable_name: String,
    value: Value,
    default_value: Option<Value>,
}

impl VariableAction {
    fn resolve(
        &self,
        ctx: &Context,
    ) -> Value {
        match self.operation {
            VariableOperation::Set => self.value.clone(),
            VariableOperation::Read => {
                let named = (!self.variable_name.is_empty()).then(|| ctx.variable(&self.variable_name)).flatten();
                match (named, &self.default_value) {
                    (Some(v), _) if !v.is_null() => v.clone(),
                    (_, Some(default)) => default.clone(),
                    _ => ctx.input().clone(),
                }
            }
        }
    }
}

#[async_trait]
impl Action for VariableAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "set"],
                    "description": "read a variable or emit a constant, defaults to read"
                },
                "variableName": {
                    "type": "string",
                    "description": "Variable or input key to read, empty reads the whole input"
                },
                "value": {
                    "description": "Constant emitted by set, supports templates like {{block.path}}"
                },
                "defaultValue": {
                    "description": "Fallback when the variable is absent"
                }
            }
        })
    }

    fn block_type(&self) -> BlockType {
        BlockType::Variable
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        _block_id: &str,
    ) -> std::result::Result<Vars, BlockError> {
        let value = self.resolve(&ctx);

        let mut outputs = Vars::new();
        if !self.variable_name.is_empty() && self.variable_name != VALUE_KEY {
            outputs.insert(self.variable_name.clone(), value.clone());
        }
        outputs.insert(VALUE_KEY.to_string(), value);
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_read_variable_and_fallbacks() {
        let ctx = test_context(json!({"topic": "rust"}));

        let action = VariableAction::create(json!({"variableName": "topic"})).unwrap();
        let outputs = action.run(ctx.clone(), "v").await.unwrap();
        assert_eq!(outputs.get_value("value"), Some(&json!("rust")));
        assert_eq!(outputs.get_value("topic"), Some(&json!("rust")));

        let action = VariableAction::create(json!({"variableName": "missing", "defaultValue": 7})).unwrap();
        let outputs = action.run(ctx.clone(), "v").await.unwrap();
        assert_eq!(outputs.get_value("value"), Some(&json!(7)));

        let action = VariableAction::create(json!({})).unwrap();
        let outputs = action.run(ctx, "v").await.unwrap();
        assert_eq!(outputs.get_value("value"), Some(&json!({"topic": "rust"})));
    }

    #[tokio::test]
    async fn test_set_constant() {
        let ctx = test_context(json!({}));
        let action = VariableAction::create(json!({"operation": "set", "value": [1, 2]})).unwrap();
        let outputs = action.run(ctx, "v").await.unwrap();
        assert_eq!(outputs.get_value("value"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_invalid_operation() {
        assert!(VariableAction::create(json!({"operation": "delete"})).is_err());
    }
}

use serde::{Deserialize, Serialize};

/// Directed dependency `source[:sourceOutput] -> target[:targetInput]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionModel {
    #[serde(default)]
    pub id: String,
    pub source_block_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_output: Option<String>,
    pub target_block_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_input: Option<String>,
}

impl ConnectionModel {
    pub fn new(
        source: &str,
        target: &str,
    ) -> Self {
        Self {
            id: String::new(),
            source_block_id: source.to_string(),
            source_output: None,
            target_block_id: target.to_string(),
            target_input: None,
        }
    }

    /// Connection id, falling back to `source->target` when none was given.
    pub fn connection_id(&self) -> String {
        if self.id.is_empty() {
            format!("{}->{}", self.source_block_id, self.target_block_id)
        } else {
            self.id.clone()
        }
    }
}

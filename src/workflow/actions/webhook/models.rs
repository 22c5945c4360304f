use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    #[default]
    None,
    Bearer,
    Basic,
    Custom,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
pub enum HttpRequestMethod {
    GET,
    #[default]
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    None,
    Text,
    #[default]
    Json,
    #[serde(alias = "form")]
    Urlencoded,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorizationConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthorizationType,
    pub api_key: Option<String>,
    /// Header carrying the credential, `Authorization` when unset.
    pub header: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpBody {
    pub content_type: ContentType,
    pub data: Option<JsonValue>,
}

/// Response fields folded into the block outputs.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Parsed JSON when the body is JSON, the text otherwise.
    pub body: JsonValue,
    pub raw: String,
}

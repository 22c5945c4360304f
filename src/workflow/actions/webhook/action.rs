use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result,
    common::Vars,
    error::BlockError,
    runtime::Context,
    workflow::actions::{Action, BlockType, parse_config},
};

use super::models::*;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAction {
    url: String,
    #[serde(default)]
    method: HttpRequestMethod,
    #[serde(default)]
    auth: AuthorizationConfig,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    params: HashMap<String, String>,
    #[serde(default)]
    body: HttpBody,
    /// Raw text body, takes precedence over `body`.
    #[serde(default)]
    body_template: Option<String>,
    /// request timeout in milliseconds, bounded by the block timeout anyway
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl WebhookAction {
    /// Apply authorization headers based on auth config
    fn apply_auth_headers(
        &self,
        headers: &mut HeaderMap,
    ) -> std::result::Result<(), BlockError> {
        if self.auth.auth_type == AuthorizationType::None {
            return Ok(());
        }
        let api_key = self
            .auth
            .api_key
            .as_ref()
            .ok_or_else(|| BlockError::validation(format!("apiKey is required for {:?} authorization", self.auth.auth_type)))?;

        let header_name = self.auth.header.as_deref().unwrap_or("Authorization");
        let header_key: HeaderName = header_name.parse().map_err(|err: reqwest::header::InvalidHeaderName| BlockError::validation(err.to_string()))?;

        let header_value = match self.auth.auth_type {
            AuthorizationType::Bearer => format!("Bearer {}", api_key),
            AuthorizationType::Basic => {
                // `user:password` is encoded, anything else is taken as already encoded
                let encoded = if api_key.contains(':') {
                    STANDARD.encode(api_key.as_bytes())
                } else {
                    api_key.clone()
                };
                format!("Basic {}", encoded)
            }
            AuthorizationType::Custom | AuthorizationType::None => api_key.clone(),
        };

        headers.insert(header_key, header_value.parse().map_err(|err: InvalidHeaderValue| BlockError::validation(err.to_string()))?);
        Ok(())
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
    ) -> std::result::Result<reqwest::RequestBuilder, BlockError> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("accept"), HeaderValue::from_static("*/*"));

        self.apply_auth_headers(&mut headers)?;

        for (key, value) in &self.headers {
            headers.insert(
                key.parse::<HeaderName>().map_err(|err| BlockError::validation(err.to_string()))?,
                value.parse().map_err(|err: InvalidHeaderValue| BlockError::validation(err.to_string()))?,
            );
        }

        let method: reqwest::Method = self
            .method
            .as_ref()
            .parse()
            .map_err(|_| BlockError::validation(format!("invalid method '{:?}'", self.method)))?;

        let query: Vec<(&String, &String)> = self.params.iter().collect();
        let mut request = client.request(method, &self.url).headers(headers).query(&query);

        if let Some(text) = &self.body_template {
            request = request.body(text.clone());
        } else if let Some(data) = &self.body.data {
            match self.body.content_type {
                ContentType::None => {}
                ContentType::Text => {
                    let text = match data {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    request = request.body(text);
                }
                ContentType::Json => {
                    request = request.json(data);
                }
                ContentType::Urlencoded => {
                    let form = data.as_object().ok_or_else(|| BlockError::validation("urlencoded body must be an object"))?;
                    request = request.form(form);
                }
            }
        }

        if let Some(ms) = self.timeout_ms.filter(|ms| *ms > 0) {
            request = request.timeout(Duration::from_millis(ms));
        }

        Ok(request)
    }
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl Action for WebhookAction {
    fn create(params: Value) -> Result<Self> {
        parse_config(params, &Self::schema())
    }

    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Request URL, supports templates like {{block.path}}"
                },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                },
                "auth": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["none", "bearer", "basic", "custom"] },
                        "apiKey": { "type": ["string", "null"] },
                        "header": { "type": ["string", "null"] }
                    }
                },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "params": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "body": {
                    "type": "object",
                    "properties": {
                        "contentType": { "type": "string", "enum": ["none", "text", "json", "urlencoded", "form"] },
                        "data": {}
                    }
                },
                "bodyTemplate": { "type": ["string", "null"] },
                "timeoutMs": {
                    "type": ["integer", "null"],
                    "minimum": 0,
                    "description": "Request timeout in milliseconds"
                }
            }
        })
    }

    fn block_type(&self) -> BlockType {
        BlockType::Webhook
    }

    async fn run(
        &self,
        ctx: Arc<Context>,
        block_id: &str,
    ) -> std::result::Result<Vars, BlockError> {
        let request = self.build_request(&ctx.services().http)?;
        tracing::debug!(block_id, url = %self.url, method = self.method.as_ref(), "Sending webhook");

        let res = request.send().await?;
        let status = res.status().as_u16();
        let wait = retry_after(res.headers());
        let headers: HashMap<String, String> = res.headers().iter().map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string())).collect();
        let raw = res.text().await?;

        if !(200..300).contains(&status) {
            let err = BlockError::from_status(status, &raw);
            return Err(match wait {
                Some(wait) => err.with_retry_after(wait),
                None => err,
            });
        }

        let body = serde_json::from_str::<Value>(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
        let response = WebhookResponse {
            status,
            headers,
            body,
            raw,
        };
        Ok(serde_json::to_value(response).map_err(|e| BlockError::server_error(e.to_string()))?.into())
    }
}

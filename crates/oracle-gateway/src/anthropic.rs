//! Anthropic Messages API adapter.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::http::{build_client, embedded_error, post_json};
use crate::{screen_reply, Oracle, OracleReply, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicOracle {
    config: OracleConfig,
    client: reqwest::Client,
    url: String,
}

impl AnthropicOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        if let Some(key) = config.resolve_api_key()? {
            let value = HeaderValue::from_str(&key)
                .map_err(|e| OracleError::Config(format!("invalid x-api-key header: {e}")))?;
            headers.insert("x-api-key", value);
        }

        let client = build_client(&config, headers)?;
        let url = format!("{}/messages", config.base_url());
        Ok(Self {
            config,
            client,
            url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub(crate) fn request_body(config: &OracleConfig, prompt: &str) -> Value {
    let mut body = json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": config.temperature,
    });
    if config.top_p < 1.0 {
        body["top_p"] = json!(config.top_p);
    }
    if config.top_k > 0 {
        body["top_k"] = json!(config.top_k);
    }
    if let Some(stop) = config.stop.as_ref().filter(|s| !s.is_empty()) {
        body["stop_sequences"] = json!(stop);
    }
    body
}

pub(crate) fn parse_response(raw: &Value) -> Result<(String, u64)> {
    let tokens = raw
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .map(|u| u.input_tokens + u.output_tokens)
        .unwrap_or(0);

    if let Some(message) = embedded_error(raw) {
        return Err(OracleError::ErrorReply {
            message,
            tokens_used: tokens,
        });
    }

    let parsed: MessagesResponse = serde_json::from_value(raw.clone())
        .map_err(|e| OracleError::InvalidResponse(format!("messages response: {e}")))?;
    let text = parsed
        .content
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    let tokens = parsed
        .usage
        .map(|u| u.input_tokens + u.output_tokens)
        .unwrap_or(tokens);
    Ok((text, tokens))
}

#[async_trait]
impl Oracle for AnthropicOracle {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(&self, prompt: &str) -> Result<OracleReply> {
        let body = request_body(&self.config, prompt);
        let raw = post_json(&self.client, &self.config, &self.url, &body).await?;
        let (text, tokens_used) = parse_response(&raw)?;
        info!(
            event = "oracle.invoked",
            oracle = %self.config.name,
            provider = "anthropic",
            tokens_used,
        );
        screen_reply(text, tokens_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    #[test]
    fn body_uses_stop_sequences_key() {
        let mut cfg = OracleConfig::new("c", Provider::Anthropic, "claude-x");
        cfg.stop = Some(vec!["END".to_string()]);
        let body = request_body(&cfg, "p");
        assert_eq!(body["stop_sequences"], json!(["END"]));
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn joins_text_blocks_and_sums_usage() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "part one "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "part two"}
            ],
            "usage": {"input_tokens": 100, "output_tokens": 20}
        });
        assert_eq!(
            parse_response(&raw).unwrap(),
            ("part one part two".to_string(), 120)
        );
    }

    #[test]
    fn error_object_becomes_error_reply() {
        let raw = json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}});
        assert!(matches!(
            parse_response(&raw),
            Err(OracleError::ErrorReply { ref message, .. }) if message == "Overloaded"
        ));
    }
}

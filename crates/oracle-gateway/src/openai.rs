//! OpenAI-compatible chat completions adapter.
//!
//! Serves the `openai`, `openrouter`, `groq` and `ollama` providers: all of
//! them accept `POST <base_url>/chat/completions` with a bearer token.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::info;

use crate::config::{OracleConfig, Provider};
use crate::error::OracleError;
use crate::http::{build_client, embedded_error, post_json};
use crate::{screen_reply, Oracle, OracleReply, Result};

pub struct OpenAiCompatibleOracle {
    config: OracleConfig,
    client: reqwest::Client,
    url: String,
}

impl OpenAiCompatibleOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = config.resolve_api_key()? {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| OracleError::Config(format!("invalid Authorization header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        if config.provider == Provider::OpenRouter {
            for (env, header) in [
                ("OPENROUTER_SITE_URL", "HTTP-Referer"),
                ("OPENROUTER_APP_NAME", "X-Title"),
            ] {
                let Ok(v) = std::env::var(env) else { continue };
                if let Ok(hv) = HeaderValue::from_str(v.trim()) {
                    headers.insert(header, hv);
                }
            }
        }

        let client = build_client(&config, headers)?;
        let url = format!("{}/chat/completions", config.base_url());
        Ok(Self {
            config,
            client,
            url,
        })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }
}

pub(crate) fn request_body(config: &OracleConfig, prompt: &str) -> Value {
    let mut body = json!({
        "model": config.model,
        "messages": [{ "role": "user", "content": prompt }],
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
        "top_p": config.top_p,
        "n": config.n,
    });
    if config.top_k > 0 {
        body["top_k"] = json!(config.top_k);
    }
    if let Some(stop) = config.stop.as_ref().filter(|s| !s.is_empty()) {
        body["stop"] = json!(stop);
    }
    body
}

/// Pull `(text, tokens)` out of a chat completion body.
pub(crate) fn parse_response(raw: &Value) -> Result<(String, u64)> {
    let usage = raw.get("usage");
    let tokens = usage
        .and_then(|u| u.get("total_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or_else(|| {
            let field = |k: &str| usage.and_then(|u| u.get(k)).and_then(Value::as_u64).unwrap_or(0);
            field("prompt_tokens") + field("completion_tokens")
        });

    if let Some(message) = embedded_error(raw) {
        return Err(OracleError::ErrorReply {
            message,
            tokens_used: tokens,
        });
    }

    let content = raw
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .ok_or_else(|| OracleError::InvalidResponse("missing choices[0].message.content".into()))?;

    let text = match content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        // Some gateways return content as a list of typed parts.
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        other => {
            return Err(OracleError::InvalidResponse(format!(
                "unexpected content type: {other}"
            )))
        }
    };
    Ok((text, tokens))
}

#[async_trait]
impl Oracle for OpenAiCompatibleOracle {
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
            provider = %self.config.provider,
            tokens_used,
        );
        screen_reply(text, tokens_used)
    }
}

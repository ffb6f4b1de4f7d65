//! Oracle configuration.
//!
//! Sampling defaults are deterministic (temperature 0, top_p 1, a single
//! sample, no stop sequences) so repeated runs over the same inputs are
//! comparable.

use serde::{Deserialize, Serialize};

use crate::error::OracleError;
use crate::Result;

/// Backing service family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    OpenRouter,
    Groq,
    Ollama,
}

impl Provider {
    pub fn default_base_url(&self) -> String {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1".to_string(),
            Provider::Anthropic => "https://api.anthropic.com/v1".to_string(),
            Provider::OpenRouter => "https://openrouter.ai/api/v1".to_string(),
            Provider::Groq => "https://api.groq.com/openai/v1".to_string(),
            Provider::Ollama => {
                let host = std::env::var("OLLAMA_HOST")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                format!("{}/v1", host.trim_end_matches('/'))
            }
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
        };
        write!(f, "{s}")
    }
}

/// Configuration for one named oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Identity used in reports, output folders and the cost table.
    pub name: String,
    pub provider: Provider,
    /// Backing model identifier.
    pub model: String,
    /// Inline credential. Prefer `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Retries after the first attempt on transport errors, 429 and 5xx.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub top_k: u32,
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_top_p() -> f32 {
    1.0
}

fn default_n() -> u32 {
    1
}

impl OracleConfig {
    /// Config with deterministic sampling defaults.
    pub fn new(name: &str, provider: Provider, model: &str) -> Self {
        OracleConfig {
            name: name.to_string(),
            provider,
            model: model.to_string(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
            top_p: default_top_p(),
            top_k: 0,
            n: default_n(),
            stop: None,
        }
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = backoff_ms;
        self
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Inline key first, then `api_key_env`, then the provider's default
    /// variable.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(Some(key.to_string()));
        }

        let env_name = self
            .api_key_env
            .clone()
            .or_else(|| self.provider.default_api_key_env().map(str::to_string));

        if let Some(var) = env_name.as_deref() {
            if let Ok(value) = std::env::var(var) {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    return Ok(Some(value));
                }
            }
        }

        if self.provider.requires_api_key() {
            return Err(OracleError::MissingCredential {
                oracle: self.name.clone(),
                hint: env_name.unwrap_or_else(|| "api_key".to_string()),
            });
        }
        Ok(None)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OracleError::Config("oracle name must not be empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(OracleError::Config(format!(
                "oracle '{}' has no model identifier",
                self.name
            )));
        }
        if self.max_tokens == 0 {
            return Err(OracleError::Config(format!(
                "oracle '{}' has max_tokens = 0",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_defaults_are_deterministic() {
        let cfg: OracleConfig = toml::from_str(
            r#"
            name = "gpt4o"
            provider = "openai"
            model = "gpt-4o"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.max_tokens, 4096);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.temperature, 0.0);
        assert_eq!(cfg.top_p, 1.0);
        assert_eq!(cfg.top_k, 0);
        assert_eq!(cfg.n, 1);
        assert!(cfg.stop.is_none());
    }

    #[test]
    fn inline_key_wins() {
        let cfg = OracleConfig::new("a", Provider::Anthropic, "claude").with_api_key(" sk-test ");
        assert_eq!(cfg.resolve_api_key().unwrap().as_deref(), Some("sk-test"));
    }

    #[test]
    fn missing_key_is_reported_with_env_hint() {
        let mut cfg = OracleConfig::new("g", Provider::Groq, "llama");
        cfg.api_key_env = Some("SFCMEND_TEST_UNSET_KEY_VAR".to_string());
        let err = cfg.resolve_api_key().unwrap_err();
        assert!(err.to_string().contains("SFCMEND_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let cfg = OracleConfig::new("local", Provider::Ollama, "llama3");
        assert!(cfg.resolve_api_key().unwrap().is_none());
    }

    #[test]
    fn base_url_override_is_trimmed() {
        let cfg = OracleConfig::new("x", Provider::OpenAi, "m").with_base_url("http://127.0.0.1:9/v1/");
        assert_eq!(cfg.base_url(), "http://127.0.0.1:9/v1");
        let cfg = OracleConfig::new("x", Provider::Groq, "m");
        assert_eq!(cfg.base_url(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn validate_rejects_blank_model() {
        let cfg = OracleConfig::new("x", Provider::OpenAi, " ");
        assert!(matches!(cfg.validate(), Err(OracleError::Config(_))));
    }
}

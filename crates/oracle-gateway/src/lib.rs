//! Oracle-Gateway: interchangeable text-generation oracles
//!
//! Every backing service implements the same [`Oracle`] capability: take a
//! prompt, return generated text plus the tokens it cost, or a typed
//! [`OracleError`]. Transient transport failures are retried inside the
//! adapter; anything that survives the retry budget is terminal for the
//! caller's current iteration.
//!
//! ## Layer 1 - Oracles
//!
//! Focus: uniform invocation contract and cost reporting.

pub mod anthropic;
pub mod config;
pub mod error;
mod http;
pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicOracle;
pub use config::{OracleConfig, Provider};
pub use error::OracleError;
pub use openai::OpenAiCompatibleOracle;
pub use scripted::ScriptedOracle;

/// Result type for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;

/// Marker that flags a reply as a service-side error report.
pub const ERROR_MARKER: &str = "Error:";

/// Generated text plus its token cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReply {
    pub text: String,
    pub tokens_used: u64,
}

/// Uniform capability over a text-generation service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Identity used for output folders and cost columns.
    fn name(&self) -> &str;

    /// Generate a reply for `prompt`.
    async fn invoke(&self, prompt: &str) -> Result<OracleReply>;
}

/// Reject empty replies and replies carrying [`ERROR_MARKER`].
pub fn screen_reply(text: String, tokens_used: u64) -> Result<OracleReply> {
    if text.trim().is_empty() {
        return Err(OracleError::EmptyReply { tokens_used });
    }
    if text.contains(ERROR_MARKER) {
        return Err(OracleError::ErrorReply {
            message: text,
            tokens_used,
        });
    }
    Ok(OracleReply { text, tokens_used })
}

/// Construct the adapter matching `config.provider`.
pub fn build_oracle(config: OracleConfig) -> Result<Box<dyn Oracle>> {
    match config.provider {
        Provider::Anthropic => Ok(Box::new(AnthropicOracle::new(config)?)),
        Provider::OpenAi | Provider::OpenRouter | Provider::Groq | Provider::Ollama => {
            Ok(Box::new(OpenAiCompatibleOracle::new(config)?))
        }
    }
}

/// Build the oracles named in `names` (case-insensitive), in that order.
pub fn instantiate_oracles(names: &[String], configs: &[OracleConfig]) -> Result<Vec<Box<dyn Oracle>>> {
    select_configs(names, configs)?
        .into_iter()
        .map(build_oracle)
        .collect()
}

/// Resolve `names` against `configs` without building clients.
pub fn select_configs(names: &[String], configs: &[OracleConfig]) -> Result<Vec<OracleConfig>> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(|wanted| {
            configs
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(wanted))
                .cloned()
                .ok_or_else(|| OracleError::Config(format!("no oracle named '{wanted}' is configured")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_reply_passes_clean_text() {
        let reply = screen_reply("```python\nsteps2 = []\n```".to_string(), 9).unwrap();
        assert_eq!(reply.tokens_used, 9);
    }

    #[test]
    fn screen_reply_rejects_blank() {
        assert_eq!(
            screen_reply("  \n".to_string(), 3),
            Err(OracleError::EmptyReply { tokens_used: 3 })
        );
    }

    #[test]
    fn select_configs_preserves_requested_order() {
        let configs = vec![
            OracleConfig::new("GPT4o", Provider::OpenAi, "gpt-4o"),
            OracleConfig::new("claude", Provider::Anthropic, "claude-x"),
        ];
        let picked = select_configs(&["claude".into(), " gpt4o ".into(), "".into()], &configs).unwrap();
        let names: Vec<_> = picked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["claude", "GPT4o"]);
    }

    #[test]
    fn select_configs_rejects_unknown() {
        let err = select_configs(&["mystery".into()], &[]).unwrap_err();
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn build_oracle_dispatches_by_provider() {
        let cfg = OracleConfig::new("local", Provider::Ollama, "llama3");
        let oracle = build_oracle(cfg).unwrap();
        assert_eq!(oracle.name(), "local");

        let cfg = OracleConfig::new("c", Provider::Anthropic, "claude-x").with_api_key("k");
        assert_eq!(build_oracle(cfg).unwrap().name(), "c");
    }
}

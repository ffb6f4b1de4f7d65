//! Error types for oracle-gateway

use thiserror::Error;

/// Failures surfaced by an oracle invocation.
///
/// Variants raised after the service was actually reached carry the tokens
/// it billed, so callers can account for failed attempts too.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// No API key could be resolved for a provider that needs one
    #[error("no credential configured for oracle '{oracle}' (set {hint})")]
    MissingCredential { oracle: String, hint: String },

    /// Transport or transient HTTP failures outlasted the retry budget
    #[error("oracle unreachable after {attempts} attempt(s): {message}")]
    Unreachable { attempts: u32, message: String },

    /// Non-retryable HTTP status
    #[error("oracle returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),

    /// The reply carried an explicit error marker
    #[error("oracle reported an error: {message}")]
    ErrorReply { message: String, tokens_used: u64 },

    /// The reply had no text
    #[error("oracle returned an empty reply")]
    EmptyReply { tokens_used: u64 },

    /// Oracle configuration is unusable
    #[error("oracle configuration error: {0}")]
    Config(String),
}

impl OracleError {
    /// Tokens billed before the failure was detected.
    pub fn tokens_used(&self) -> u64 {
        match self {
            OracleError::ErrorReply { tokens_used, .. } | OracleError::EmptyReply { tokens_used } => {
                *tokens_used
            }
            _ => 0,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Unreachable {
            attempts: 1,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_travel_with_reply_failures() {
        let err = OracleError::ErrorReply {
            message: "Error: rate limited".to_string(),
            tokens_used: 42,
        };
        assert_eq!(err.tokens_used(), 42);
        assert_eq!(OracleError::EmptyReply { tokens_used: 7 }.tokens_used(), 7);
        assert_eq!(
            OracleError::Http {
                status: 400,
                body: "bad".to_string()
            }
            .tokens_used(),
            0
        );
    }

    #[test]
    fn unreachable_display_mentions_attempts() {
        let err = OracleError::Unreachable {
            attempts: 4,
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("4 attempt"));
    }
}

//! Shared HTTP plumbing: client construction and the bounded retry loop.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::Result;

pub(crate) fn build_client(config: &OracleConfig, headers: HeaderMap) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("sfcmend-oracle-gateway/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .default_headers(headers)
        .build()
        .map_err(|e| OracleError::Config(format!("http client build: {e}")))
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// POST `body` as JSON, retrying transport errors, 429 and 5xx up to
/// `config.max_retries` times with linear backoff.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    config: &OracleConfig,
    url: &str,
    body: &Value,
) -> Result<Value> {
    let attempts = config.max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        debug!(oracle = %config.name, attempt, url, "sending oracle request");
        match client.post(url).json(body).send().await {
            Err(e) => {
                last_error = e.to_string();
                warn!(oracle = %config.name, attempt, error = %e, "oracle request failed");
            }
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| OracleError::InvalidResponse(format!("json decode: {e}")));
                }
                let text = resp.text().await.unwrap_or_default();
                if !is_transient(status) {
                    return Err(OracleError::Http {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                last_error = format!("HTTP {}: {}", status.as_u16(), text);
                warn!(oracle = %config.name, attempt, status = status.as_u16(), "transient oracle error");
            }
        }

        if attempt < attempts {
            let delay = Duration::from_millis(config.retry_backoff_ms * u64::from(attempt));
            tokio::time::sleep(delay).await;
        }
    }

    Err(OracleError::Unreachable {
        attempts,
        message: last_error,
    })
}

/// Provider-level error objects (`{"error": {...}}`) returned with 200.
pub(crate) fn embedded_error(raw: &Value) -> Option<String> {
    let err = raw.get("error")?;
    if err.is_null() {
        return None;
    }
    Some(
        err.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn embedded_error_prefers_message() {
        assert_eq!(
            embedded_error(&json!({"error": {"message": "quota", "code": 1}})).as_deref(),
            Some("quota")
        );
        assert_eq!(embedded_error(&json!({"error": null})), None);
        assert_eq!(embedded_error(&json!({"choices": []})), None);
    }
}

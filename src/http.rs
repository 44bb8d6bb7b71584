//! JSON-over-HTTP with retry, shared by every remote provider.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors, including timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

/// Build a client whose every request is bounded by `timeout_secs`.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Read an API key from the environment variable named `var`.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// `label` names the remote service in error messages.
pub async fn post_json(
    client: &reqwest::Client,
    label: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(label, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let text = response.text().await?;
                    if text.trim().is_empty() {
                        return Ok(serde_json::Value::Null);
                    }
                    return Ok(serde_json::from_str(&text)?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    tracing::warn!(label, %status, "transient API error");
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                // Client error other than 429: give up
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                tracing::warn!(label, "request failed: {}", e);
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

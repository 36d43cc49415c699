//! Shared HTTP plumbing for the hosted backends.
//!
//! Retry strategy (same for every backend):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, … (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

pub fn client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send `request`, retrying transient failures up to `max_retries` times,
/// and decode the JSON body. An empty success body decodes as `null`.
pub async fn send_json(request: RequestBuilder, what: &str, max_retries: u32) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let req = request
            .try_clone()
            .ok_or_else(|| anyhow!("{} request body cannot be retried", what))?;

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let body = response.text().await?;
                    if body.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return Ok(serde_json::from_str(&body)?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} error {}: {}", what, status, body_text));
                    continue;
                }
                bail!("{} error {}: {}", what, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", what, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} failed after retries", what)))
}

/// Items of a list response that may be bare or wrapped in `{"<key>": [...]}`.
pub fn list_items<'a>(json: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    json.as_array()
        .or_else(|| json.get(key).and_then(|v| v.as_array()))
        .ok_or_else(|| {
            anyhow!(
                "unexpected response shape: expected a list or {{\"{}\": [...]}}",
                key
            )
        })
}

/// First string field present among `keys`.
pub fn text_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| item.get(*k).and_then(|v| v.as_str()))
}

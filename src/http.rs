//! JSON-over-HTTP plumbing shared by the local and hosted providers.
//!
//! Retry strategy (only when `max_retries > 0`):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use crate::error::{RagError, Result};

/// Transport options for one provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpOptions {
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

/// POST `body` to `url` and decode the JSON response.
///
/// `provider` labels errors (`"local"`, `"hosted"`). A fresh client is built
/// per call, so concurrent pipeline runs never share connection state.
pub(crate) async fn post_json(
    provider: &str,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    options: HttpOptions,
) -> Result<serde_json::Value> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = options.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder
        .build()
        .map_err(|e| RagError::provider(provider, e))?;

    let mut last_err = None;

    for attempt in 0..=options.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        RagError::provider(provider, format!("malformed response from {}: {}", url, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = RagError::provider(provider, format!("HTTP {} from {}: {}", status, url, body_text));

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(RagError::provider(
                    provider,
                    format!("connection to {} failed: {}", url, e),
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| RagError::provider(provider, "request failed after retries")))
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

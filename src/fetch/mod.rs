//! HTTP retrieval of remote MDS payloads.

mod auth;
mod basic;
mod client;

pub use auth::ApiKey;
pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use tracing::debug;

/// GETs `url` and parses the body as JSON. Non-success statuses are errors.
#[tracing::instrument(skip(client, headers))]
pub async fn fetch_json<C: HttpClient>(
    client: &C,
    url: &str,
    headers: HeaderMap,
) -> Result<serde_json::Value> {
    let resp = client.get(url, headers).await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("{url} returned status {status}: {body}"));
    }

    let bytes = resp.bytes().await?;
    debug!(bytes = bytes.len(), "Payload received");
    serde_json::from_slice(&bytes).with_context(|| format!("{url} did not return JSON"))
}

//! Shared HTTP plumbing for the data-source fetchers.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = concat!("omnitrade-monitors/", env!("CARGO_PKG_VERSION"));

/// Client with a hard per-request timeout, so a stalled endpoint ends the
/// cycle with an error instead of blocking the monitor loop.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")
}

/// GET `url` and decode a JSON body, failing on any non-2xx status
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    if !response.status().is_success() {
        return Err(anyhow!("{} returned {}", url, response.status()));
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("malformed payload from {}", url))
}

//! Shared HTTP plumbing.
//!
//! One [`reqwest::Client`] is built per run and reused by list fetching and
//! article extraction so connections are pooled. [`get_text`] maps every
//! network or status failure into [`CrawlError::Fetch`].

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::CrawlError;

pub const DEFAULT_USER_AGENT: &str = concat!("news_harvest/", env!("CARGO_PKG_VERSION"));

/// Build the client used for every request of a run.
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, CrawlError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(user_agent)
        .build()
        .map_err(|e| CrawlError::fetch("<client>", e.to_string()))
}

/// GET `url` and return the body as text. Non-2xx statuses are errors.
#[instrument(level = "debug", skip(client))]
pub async fn get_text(client: &Client, url: &str) -> Result<String, CrawlError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| map_reqwest_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CrawlError::fetch(url, format!("http status {}", status.as_u16())));
    }

    let body = response
        .text()
        .await
        .map_err(|e| map_reqwest_error(url, e))?;
    debug!(bytes = body.len(), "Fetched body");
    Ok(body)
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> CrawlError {
    let message = if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connect: {err}")
    } else if err.is_builder() {
        format!("invalid url: {err}")
    } else {
        err.to_string()
    };
    CrawlError::fetch(url, message)
}

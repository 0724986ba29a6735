//! Shared HTTP client construction for backend adapters.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::{AccessError, AccessResult};

pub const DUMPGATE_USER_AGENT: &str = concat!("dumpgate/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> AccessResult<reqwest::Client> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_static(DUMPGATE_USER_AGENT));

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(default_headers)
        .build()
        .map_err(|e| AccessError::config(format!("failed to create HTTP client: {}", e)))
}

/// Check that an endpoint is an absolute http(s) URL.
pub(crate) fn endpoint(raw: String) -> AccessResult<String> {
    let parsed = url::Url::parse(&raw)
        .map_err(|e| AccessError::config(format!("invalid endpoint '{}': {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw),
        other => Err(AccessError::config(format!(
            "unsupported endpoint scheme '{}' in {}",
            other, raw
        ))),
    }
}

/// Read a response body for an error message, capped at 200 characters.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => body.chars().take(200).collect(),
        _ => status.to_string(),
    }
}

/// Join a base URL and path segments without doubling slashes.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }
    url
}

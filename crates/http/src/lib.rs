//! Shared HTTP plumbing for the registry and advisory providers.

use std::env;
use std::error::Error as StdError;
use std::time::Duration;

use install_guard_core::ProviderError;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Upper bound for a single provider request. Requests are never retried.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("install-guard/", env!("CARGO_PKG_VERSION"));

/// Builds the client shared by all providers of one service instance.
pub fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("falling back to default http client: {err}");
            Client::new()
        })
}

/// Reads a base URL override from `var`, falling back to `default`.
pub fn base_url_from_env(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Decodes a JSON body. `404` maps to `Ok(None)`; other non-success statuses are transport errors.
pub async fn read_json<T: DeserializeOwned>(
    response: Response,
    provider: &str,
) -> Result<Option<T>, ProviderError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    if status.is_server_error() {
        return Err(ProviderError::Transport {
            message: format!("{provider} server error {status}"),
        });
    }

    if !status.is_success() {
        return Err(ProviderError::Transport {
            message: format!("{provider} returned status {status}"),
        });
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| ProviderError::InvalidResponse {
            message: format!("failed to parse {provider} response JSON: {e}"),
        })
}

pub fn reqwest_transport_error(
    context: &str,
    request_url: &str,
    error: reqwest::Error,
) -> ProviderError {
    let mut details = Vec::new();

    let effective_url = error
        .url()
        .map(|url| url.as_str().to_string())
        .unwrap_or_else(|| request_url.to_string());
    details.push(format!("request_url={effective_url}"));

    let mut kinds = Vec::new();
    if error.is_timeout() {
        kinds.push("timeout");
    }
    if error.is_connect() {
        kinds.push("connect");
    }
    if error.is_request() {
        kinds.push("request");
    }
    if error.is_decode() {
        kinds.push("decode");
    }
    if kinds.is_empty() {
        kinds.push("unknown");
    }
    details.push(format!("kinds={}", kinds.join(",")));

    let mut sources = Vec::new();
    let mut current = error.source();
    while let Some(source) = current {
        sources.push(source.to_string());
        if sources.len() >= 4 {
            break;
        }
        current = source.source();
    }
    if !sources.is_empty() {
        details.push(format!("source_chain={}", sources.join(" | ")));
    }

    ProviderError::Transport {
        message: format!("{context}: {error}; {}", details.join("; ")),
    }
}

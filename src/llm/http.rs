//! Shared HTTP plumbing for vendor clients.

use std::env;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ProviderError};
use crate::llm::Vendor;

/// Maximum characters of an error body kept in [`ProviderError::detail`].
const MAX_DETAIL_LENGTH: usize = 2_000;

/// Default limit for one HTTP round trip to a vendor.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Environment variable to override the request timeout (seconds).
pub const REQUEST_TIMEOUT_ENV_VAR: &str = "GROUPCOMMIT_HTTP_TIMEOUT";

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Get the request timeout.
///
/// `GROUPCOMMIT_HTTP_TIMEOUT` wins over `configured`; an invalid value logs a
/// warning and is ignored.
pub fn request_timeout(configured: Option<u64>) -> Duration {
    let fallback = configured
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    match env::var(REQUEST_TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!(
                    "Invalid {} value '{}', using {}s",
                    REQUEST_TIMEOUT_ENV_VAR, v, fallback
                );
                Duration::from_secs(fallback)
            }
        },
        _ => Duration::from_secs(fallback),
    }
}

/// HTTP client whose requests give up after `timeout`.
pub fn build_client(vendor: Vendor, timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
        .build()
        .map_err(|e| {
            ProviderError::new(
                vendor,
                ErrorKind::Unknown,
                format!("failed to build HTTP client: {}", e),
            )
        })
}

/// Classify a non-success status the way most vendors use them.
///
/// Vendor clients call this after handling their own special cases.
pub fn classify_status(status: StatusCode, body: &str) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimited,
        413 => ErrorKind::RequestTooLarge,
        400 if mentions_context_length(body) => ErrorKind::RequestTooLarge,
        500..=599 => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Unknown,
    }
}

/// Whether an error body complains about prompt size.
pub fn mentions_context_length(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("context_length")
        || lower.contains("context length")
        || lower.contains("too many tokens")
        || lower.contains("too long")
        || lower.contains("maximum context")
}

/// Send a JSON request and decode a JSON response, classifying failures.
///
/// `classify` receives the status and body of every non-success response.
pub async fn send_json<T, C>(
    vendor: Vendor,
    request: RequestBuilder,
    classify: C,
) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
    C: Fn(StatusCode, &str) -> ErrorKind,
{
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(vendor, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(vendor, e))?;

    if !status.is_success() {
        let kind = classify(status, &body);
        debug!("{} returned HTTP {} ({})", vendor, status.as_u16(), kind);
        return Err(ProviderError::new(
            vendor,
            kind,
            format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::new(
            vendor,
            ErrorKind::Unknown,
            format!("unexpected response shape: {}. Body: {}", e, truncate(&body)),
        )
    })
}

fn transport_error(vendor: Vendor, err: reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() || err.is_connect() {
        ErrorKind::ServiceUnavailable
    } else {
        ErrorKind::Unknown
    };
    ProviderError::new(vendor, kind, err.to_string())
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_DETAIL_LENGTH).collect()
}

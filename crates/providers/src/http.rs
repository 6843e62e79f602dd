//! HTTP plumbing shared by the adapters.

use std::time::Duration;
use toolgate_core::ProviderError;
use tracing::warn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Build the client used for streaming calls.
///
/// No overall request timeout: a stream may legitimately run for minutes.
/// Stalls are caught by the idle watchdog instead.
pub(crate) fn build_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {e}")))
}

/// Pass a 2xx response through; map anything else to a [`ProviderError`].
///
/// `fallback` names the failure when the body carries no error message.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
    fallback: impl FnOnce(u16) -> String,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    let body = response.text().await.unwrap_or_default();
    warn!(provider, status, body = %body, "Provider returned error");
    Err(ProviderError::ApiError {
        status_code: status,
        message: error_message(&body).unwrap_or_else(|| fallback(status)),
    })
}

/// `error.message` from a JSON error body, or an array of them (Gemini
/// wraps its error in a one-element array).
pub(crate) fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(String::from)
}

/// Split a leading `**Title**` off a reasoning chunk.
pub(crate) fn reasoning_title(text: &str) -> Option<String> {
    let rest = text.trim_start().strip_prefix("**")?;
    let end = rest.find("**")?;
    let title = rest[..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}

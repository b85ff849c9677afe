//! HTTP utilities for gateway REST calls

use super::model::{RemoteError, RemoteResult};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Longest provider back-off hint honoured
const MAX_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

/// Per-request timeout; waiting on a resource is done by the caller, not here
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let total = body.chars().count();
    let truncated = if total > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull the provider error code and message out of an error body.
///
/// Understands `{"error": {"code", "message"}}`, the flat `{"code", "message"}`
/// shape and the `{"__type": "prefix#Code"}` shape used by JSON-protocol services.
pub(crate) fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };

    let envelope = json.get("error").filter(|e| e.is_object()).unwrap_or(&json);

    let code = envelope
        .get("code")
        .or_else(|| envelope.get("Code"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .or_else(|| {
            json.get("__type")
                .and_then(|v| v.as_str())
                .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        });

    let message = envelope
        .get("message")
        .or_else(|| envelope.get("Message"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    (code, message)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn error_from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> RemoteError {
    let (code, message) = parse_error_body(body);
    let message = message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    let mut error = RemoteError::http(status.as_u16(), code, message);
    if let Some(delay) = retry_after(headers) {
        error = error.with_retry_after(delay);
    }
    error
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::transport(format!("request timed out: {err}"))
    } else {
        RemoteError::transport(format!("failed to send request: {err}"))
    }
}

fn parse_json(body: &str) -> RemoteResult<Value> {
    // Handle empty response
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(body)
        .map_err(|e| RemoteError::coded("InvalidResponse", format!("failed to parse response JSON: {e}")))
}

/// HTTP client wrapper for gateway API calls
#[derive(Clone, Debug)]
pub struct GatewayHttpClient {
    client: Client,
}

impl GatewayHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("skyctl/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Send a request and return the raw body of a successful response
    async fn send(&self, request: RequestBuilder) -> RemoteResult<Vec<u8>> {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(error_from_response(status, &headers, &text));
        }

        Ok(body.to_vec())
    }

    async fn send_json(&self, request: RequestBuilder) -> RemoteResult<Value> {
        let body = self.send(request).await?;
        parse_json(&String::from_utf8_lossy(&body))
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> RemoteResult<Value> {
        tracing::debug!("GET {}", url);
        self.send_json(self.client.get(url)).await
    }

    /// Make a POST request
    pub async fn post(&self, url: &str, body: Option<&Value>) -> RemoteResult<Value> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send_json(request).await
    }

    /// Make a PUT request
    pub async fn put(&self, url: &str, body: Option<&Value>) -> RemoteResult<Value> {
        tracing::debug!("PUT {}", url);

        let mut request = self.client.put(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send_json(request).await
    }

    /// Make a PUT request with a raw body
    pub async fn put_bytes(&self, url: &str, body: Vec<u8>) -> RemoteResult<Value> {
        tracing::debug!("PUT {} ({} bytes)", url, body.len());

        let request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        self.send_json(request).await
    }

    /// Make a GET request and return the raw body
    pub async fn get_bytes(&self, url: &str) -> RemoteResult<Vec<u8>> {
        tracing::debug!("GET {} (raw)", url);
        self.send(self.client.get(url)).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: &str) -> RemoteResult<Value> {
        tracing::debug!("DELETE {}", url);
        self.send_json(self.client.delete(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn test_sanitize_handles_multibyte() {
        let body = "é".repeat(300);
        // Must not panic on a char boundary
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("truncated"));
    }

    #[test]
    fn test_parse_nested_error_body() {
        let (code, message) =
            parse_error_body(r#"{"error": {"code": "NoSuchBucket", "message": "gone"}}"#);
        assert_eq!(code.as_deref(), Some("NoSuchBucket"));
        assert_eq!(message.as_deref(), Some("gone"));
    }

    #[test]
    fn test_parse_numeric_code() {
        let (code, _) = parse_error_body(r#"{"error": {"code": 429, "message": "slow down"}}"#);
        assert_eq!(code.as_deref(), Some("429"));
    }

    #[test]
    fn test_parse_json_protocol_type() {
        let (code, message) = parse_error_body(
            r#"{"__type": "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException", "message": "Requested resource not found"}"#,
        );
        assert_eq!(code.as_deref(), Some("ResourceNotFoundException"));
        assert_eq!(message.as_deref(), Some("Requested resource not found"));
    }

    #[test]
    fn test_retry_after_is_clamped() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "18446744073709551615".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(MAX_RETRY_AFTER));

        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_parse_non_json_body() {
        assert_eq!(parse_error_body("<html>oops</html>"), (None, None));
    }
}

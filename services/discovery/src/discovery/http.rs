//! Shared HTTP plumbing for the Dialogflow CX REST adapters

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

use super::error::RemoteError;

/// API version path segment
pub const API_VERSION: &str = "v3";

/// Longest error body kept in a `RemoteError` message
const MAX_ERROR_BODY: usize = 512;

/// Google API error envelope
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Build the client shared by the lister and the probe
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Pass through successful responses; map the rest to `RemoteError`
pub async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status.as_u16(), error_message(&body)))
}

fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        if !envelope.error.message.is_empty() {
            return envelope.error.message;
        }
    }

    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        trimmed.to_string()
    } else {
        let mut end = MAX_ERROR_BODY;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_google_envelope() {
        let body = r#"{"error":{"code":403,"message":"Permission 'dialogflow.sessions.detectIntent' denied","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            error_message(body),
            "Permission 'dialogflow.sessions.detectIntent' denied"
        );
    }

    #[test]
    fn test_error_message_truncates_raw_bodies() {
        assert_eq!(error_message("  upstream unavailable \n"), "upstream unavailable");

        let long = "x".repeat(2000);
        let message = error_message(&long);
        assert!(message.ends_with("..."));
        assert_eq!(message.len(), MAX_ERROR_BODY + 3);
    }
}

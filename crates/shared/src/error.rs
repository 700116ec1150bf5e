//! Client-side error type for resource requests.

use serde::Deserialize;
use thiserror::Error;

/// Error returned by any resource request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    /// The server answered with `success: false`.
    #[error("Request rejected: {message}")]
    Rejected { message: String },
    #[error("Response carried no data")]
    MissingData,
}

impl ApiError {
    /// Message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, .. } => {
                try_envelope_message(body).unwrap_or_else(|| self.to_string())
            }
            ApiError::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct MessageOnly {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Pull a human-readable message out of an error body.
/// Prefers the envelope `message`, falls back to a problem-details `title`.
pub fn try_envelope_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<MessageOnly>(body).ok()?;
    parsed
        .message
        .filter(|m| !m.trim().is_empty())
        .or(parsed.title.filter(|t| !t.trim().is_empty()))
}

//! Failure taxonomy for calls into the generative-model service.
//!
//! Every transport or model failure is folded into one of a handful of
//! variants so the session can surface a single readable line to the user.

use thiserror::Error;

pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Quota or rate limit hit; retrying later is expected to work.
    #[error("Rate limit reached. Wait a moment and try again.")]
    RateLimited,

    /// Credentials or endpoint configuration are wrong.
    #[error("API configuration problem: {0}")]
    AuthConfig(String),

    /// The service refused the content.
    #[error("The request was blocked by the content safety filter. Try rephrasing it.")]
    SafetyBlocked,

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Synthesis error: {0}")]
    Unknown(String),
}

impl GenerationError {
    /// Classify a failed HTTP exchange from its status code and body text.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        let lowered = message.to_lowercase();

        match status {
            Some(429) => return Self::RateLimited,
            Some(401) | Some(403) => return Self::AuthConfig(summarize(message)),
            _ => {}
        }

        if lowered.contains("quota")
            || lowered.contains("rate limit")
            || lowered.contains("resource_exhausted")
            || lowered.contains("resource exhausted")
        {
            Self::RateLimited
        } else if lowered.contains("api key")
            || lowered.contains("api_key")
            || lowered.contains("permission")
            || lowered.contains("unauthenticated")
        {
            Self::AuthConfig(summarize(message))
        } else if lowered.contains("safety") || lowered.contains("blocked") {
            Self::SafetyBlocked
        } else {
            Self::Unknown(summarize(message))
        }
    }

    pub fn from_transport(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        Self::classify(status, &err.to_string())
    }

    /// The single line shown to the user.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

// Service error bodies can be large JSON documents; keep the first line only.
fn summarize(message: &str) -> String {
    let line = message.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.is_empty() {
        return "unknown error".to_string();
    }
    if line.chars().count() > 200 {
        let cut: String = line.chars().take(200).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_codes_take_precedence() {
        assert_eq!(GenerationError::classify(Some(429), "whatever"), GenerationError::RateLimited);
        assert_matches!(
            GenerationError::classify(Some(403), "forbidden"),
            GenerationError::AuthConfig(_)
        );
        assert_matches!(
            GenerationError::classify(Some(401), ""),
            GenerationError::AuthConfig(msg) if msg == "unknown error"
        );
    }

    #[test]
    fn message_keywords_are_classified() {
        assert_eq!(
            GenerationError::classify(Some(400), "RESOURCE_EXHAUSTED: quota exceeded"),
            GenerationError::RateLimited
        );
        assert_matches!(
            GenerationError::classify(Some(400), "API key not valid. Please pass a valid API key."),
            GenerationError::AuthConfig(_)
        );
        assert_eq!(
            GenerationError::classify(None, "Response was blocked due to SAFETY"),
            GenerationError::SafetyBlocked
        );
        assert_matches!(
            GenerationError::classify(Some(500), "internal"),
            GenerationError::Unknown(msg) if msg == "internal"
        );
    }

    #[test]
    fn user_message_is_single_line() {
        let err = GenerationError::classify(Some(500), "first line\nsecond line");
        assert_eq!(err.user_message(), "Synthesis error: first line");
        assert!(!GenerationError::SafetyBlocked.user_message().is_empty());
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(500);
        let GenerationError::Unknown(msg) = GenerationError::classify(None, &long) else {
            panic!("expected unknown");
        };
        assert_eq!(msg.chars().count(), 203);
    }
}

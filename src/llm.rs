//! Language model clients.
//!
//! Extraction talks to models only through the [`LanguageModel`] trait.
//! `OllamaClient` serves local models, `GeminiClient` serves `gemini*` model
//! ids, and [`ModelRouter`] picks between them per call.
mod gemini;
mod ollama;
mod router;

use std::thread;
use std::time::Duration;

use thiserror::Error;

pub use gemini::{GeminiClient, GeminiClientBuilder};
pub use ollama::{OllamaClient, OllamaClientBuilder};
pub use router::ModelRouter;

/// Errors that can occur when calling a language model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Provider-specific errors (unexpected payloads, refusals)
    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A provider that needs an API key was used without one
    #[error("No API key configured for {provider} (set {env_var})")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },
}

impl LlmError {
    /// Maps a transport error, keeping timeouts distinguishable.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(error)
        } else {
            LlmError::Network(error)
        }
    }
}

/// A text-in, text-out language model.
///
/// This trait enables mocking in unit tests and lets the extractor stay
/// independent of the provider.
pub trait LanguageModel: Send + Sync {
    /// Generates a completion for `prompt` using `model`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError` if the request fails or the response cannot be read.
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError>;
}

/// Retries an operation with exponential backoff.
///
/// The operation is attempted once and then retried up to 3 times with delays
/// of 1s, 2s and 4s. Only transient errors (network, timeout, HTTP 5xx) are
/// retried.
pub fn retry_with_backoff<F, T>(f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Result<T, LlmError>,
{
    retry_with_delays(&[1, 2, 4], f)
}

fn retry_with_delays<F, T>(delays_secs: &[u64], mut f: F) -> Result<T, LlmError>
where
    F: FnMut() -> Result<T, LlmError>,
{
    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) if !should_retry(&e) => return Err(e),
        Err(e) => e,
    };

    for &delay_secs in delays_secs {
        tracing::debug!(delay_secs, error = %last_error, "retrying model call");
        thread::sleep(Duration::from_secs(delay_secs));

        match f() {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

/// Returns `true` for transient errors (HTTP 5xx, network errors, timeouts).
fn should_retry(error: &LlmError) -> bool {
    match error {
        LlmError::Network(_) | LlmError::Timeout(_) => true,
        LlmError::Http { status } => (500..600).contains(status),
        LlmError::Serialization(_)
        | LlmError::Api { .. }
        | LlmError::InvalidUrl(_)
        | LlmError::MissingApiKey { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::error::Error;

    fn network_error() -> LlmError {
        LlmError::Network(
            reqwest::blocking::Client::new()
                .get("not-a-valid-url")
                .build()
                .unwrap_err(),
        )
    }

    #[test]
    fn http_error_display_includes_status() {
        let error_msg = LlmError::Http { status: 404 }.to_string();
        assert!(error_msg.contains("HTTP error"));
        assert!(error_msg.contains("404"));
    }

    #[test]
    fn serialization_error_keeps_source() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error = LlmError::Serialization(json_error);
        assert!(error.to_string().contains("Serialization error"));
        assert!(error.source().is_some());
    }

    #[test]
    fn api_error_names_provider() {
        let error = LlmError::Api {
            provider: "Ollama",
            message: "model not found".to_string(),
        };
        assert_eq!(error.to_string(), "Ollama API error: model not found");
    }

    #[test]
    fn missing_api_key_names_env_var() {
        let error = LlmError::MissingApiKey {
            provider: "Gemini",
            env_var: "GEMINI_API_KEY",
        };
        assert!(error.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn retry_succeeds_after_transient_network_error() {
        let attempts = Cell::new(0);
        let result = retry_with_delays(&[0, 0, 0], || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 2 {
                Err(network_error())
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn retry_stops_after_all_delays_are_used() {
        let attempts = Cell::new(0);
        let result: Result<(), LlmError> = retry_with_delays(&[0, 0, 0], || {
            attempts.set(attempts.get() + 1);
            Err(LlmError::Http { status: 503 })
        });

        assert!(matches!(result, Err(LlmError::Http { status: 503 })));
        assert_eq!(attempts.get(), 4);
    }

    #[test]
    fn retry_does_not_occur_on_http_4xx_errors() {
        let attempts = Cell::new(0);
        let result: Result<(), LlmError> = retry_with_delays(&[0, 0, 0], || {
            attempts.set(attempts.get() + 1);
            Err(LlmError::Http { status: 404 })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn retry_does_not_occur_on_api_errors() {
        let attempts = Cell::new(0);
        let result: Result<(), LlmError> = retry_with_delays(&[0, 0, 0], || {
            attempts.set(attempts.get() + 1);
            Err(LlmError::Api {
                provider: "Gemini",
                message: "blocked".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}

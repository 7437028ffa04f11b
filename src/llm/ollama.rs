//! Ollama HTTP client.
//!
//! Calls the `/api/generate` endpoint of a local or remote Ollama server in
//! non-streaming JSON mode.
use std::time::Duration;

use super::{LanguageModel, LlmError, retry_with_backoff};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Builder for constructing `OllamaClient` instances.
///
/// # Examples
///
/// ```
/// use lxs::llm::OllamaClientBuilder;
///
/// let client = OllamaClientBuilder::new()
///     .base_url("http://localhost:11434")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.base_url(), "http://localhost:11434");
/// ```
#[derive(Debug, Default)]
pub struct OllamaClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl OllamaClientBuilder {
    /// Creates a new `OllamaClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL for the Ollama API (e.g., "http://localhost:11434").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the request timeout. Defaults to 300 seconds, since extraction
    /// prompts on local hardware can be slow.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `OllamaClient` with the configured settings.
    ///
    /// If `base_url()` was not called, the `OLLAMA_HOST` environment variable
    /// is used, falling back to `http://localhost:11434`. A trailing slash is
    /// trimmed.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidUrl` if the base URL does not parse.
    pub fn build(self) -> Result<OllamaClient, LlmError> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        reqwest::Url::parse(&base_url)
            .map_err(|e| LlmError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(300)))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(LlmError::Network)?;

        Ok(OllamaClient { client, base_url })
    }
}

/// Synchronous client for the Ollama API.
///
/// Construct it with [`OllamaClientBuilder`].
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl OllamaClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn generate_internal(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = generate_request_body(model, prompt);

        retry_with_backoff(|| {
            let response = self
                .client
                .post(&url)
                .json(&request_body)
                .send()
                .map_err(LlmError::from_transport)?;

            let status = response.status();
            if !status.is_success() {
                return Err(LlmError::Http {
                    status: status.as_u16(),
                });
            }

            let json: serde_json::Value = response.json().map_err(LlmError::from_transport)?;
            parse_generate_response(&json)
        })
    }
}

impl LanguageModel for OllamaClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(model, base_url = %self.base_url, "calling Ollama");
        self.generate_internal(model, prompt)
    }
}

fn generate_request_body(model: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "format": "json",
        "options": { "temperature": 0.0 }
    })
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String, LlmError> {
    if let Some(message) = json.get("error").and_then(|v| v.as_str()) {
        return Err(LlmError::Api {
            provider: "Ollama",
            message: message.to_string(),
        });
    }

    json.get("response")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::Api {
            provider: "Ollama",
            message: "Missing 'response' field in API response".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn base_url_method_sets_custom_url() {
        let client = OllamaClientBuilder::new()
            .base_url("http://example.com:11434/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://example.com:11434");
    }

    #[test]
    #[serial]
    fn build_uses_default_url_when_nothing_is_configured() {
        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    #[serial]
    fn build_reads_ollama_host_environment_variable_if_set() {
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://custom-host:11434");
        }

        let client = OllamaClientBuilder::new().build().unwrap();
        assert_eq!(client.base_url(), "http://custom-host:11434");

        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }
    }

    #[test]
    #[serial]
    fn builder_url_takes_precedence_over_environment() {
        unsafe {
            std::env::set_var("OLLAMA_HOST", "http://env-var-host:11434");
        }

        let client = OllamaClientBuilder::new()
            .base_url("http://builder-host:11434")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://builder-host:11434");

        unsafe {
            std::env::remove_var("OLLAMA_HOST");
        }
    }

    #[test]
    fn build_returns_error_if_invalid_url_provided() {
        let result = OllamaClientBuilder::new().base_url("not-a-valid-url").build();
        assert!(matches!(result, Err(LlmError::InvalidUrl(_))));
    }

    #[test]
    fn request_body_asks_for_json_without_streaming() {
        let body = generate_request_body("gemma3:4b", "prompt text");
        assert_eq!(body["model"], "gemma3:4b");
        assert_eq!(body["prompt"], "prompt text");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
    }

    #[test]
    fn parses_response_field() {
        let json = serde_json::json!({ "response": "{\"extractions\": []}", "done": true });
        assert_eq!(parse_generate_response(&json).unwrap(), "{\"extractions\": []}");
    }

    #[test]
    fn surfaces_error_field_as_api_error() {
        let json = serde_json::json!({ "error": "model 'nope' not found" });
        let err = parse_generate_response(&json).unwrap_err();
        assert!(matches!(err, LlmError::Api { provider: "Ollama", .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn missing_response_field_is_an_api_error() {
        let json = serde_json::json!({ "done": true });
        assert!(matches!(
            parse_generate_response(&json),
            Err(LlmError::Api { .. })
        ));
    }
}

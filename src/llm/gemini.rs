//! Gemini (Generative Language API) client.
use std::time::Duration;

use super::{LanguageModel, LlmError, retry_with_backoff};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables checked for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "LANGEXTRACT_API_KEY"];

/// Builder for constructing `GeminiClient` instances.
#[derive(Debug, Default)]
pub struct GeminiClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API root (mostly useful for proxies).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the client.
    ///
    /// Without an explicit key, `GEMINI_API_KEY` then `LANGEXTRACT_API_KEY`
    /// are read from the environment.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` when no key is found and
    /// `LlmError::InvalidUrl` for a malformed base URL.
    pub fn build(self) -> Result<GeminiClient, LlmError> {
        let api_key = self
            .api_key
            .or_else(api_key_from_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey {
                provider: "Gemini",
                env_var: API_KEY_ENV_VARS[0],
            })?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| LlmError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(120)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(LlmError::Network)?;

        Ok(GeminiClient {
            client,
            base_url,
            api_key,
        })
    }
}

fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok())
}

/// Synchronous client for `models/{model}:generateContent`.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl LanguageModel for GeminiClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let request_body = generate_request_body(prompt);
        tracing::debug!(model, "calling Gemini");

        retry_with_backoff(|| {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
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

fn generate_request_body(prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": 0.0,
            "responseMimeType": "application/json"
        }
    })
}

/// Concatenates the text parts of the first candidate.
fn parse_generate_response(json: &serde_json::Value) -> Result<String, LlmError> {
    let api_error = |message: String| LlmError::Api {
        provider: "Gemini",
        message,
    };

    if let Some(message) = json.pointer("/error/message").and_then(|v| v.as_str()) {
        return Err(api_error(message.to_string()));
    }

    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|v| v.as_str())
                .unwrap_or("no candidates returned");
            api_error(reason.to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        return Err(api_error("candidate contained no text".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn build_fails_without_any_api_key() {
        unsafe {
            for name in API_KEY_ENV_VARS {
                std::env::remove_var(name);
            }
        }

        let result = GeminiClientBuilder::new().build();
        assert!(matches!(
            result,
            Err(LlmError::MissingApiKey { provider: "Gemini", .. })
        ));
    }

    #[test]
    #[serial]
    fn build_falls_back_to_second_env_var() {
        unsafe {
            std::env::remove_var("GEMINI_API_KEY");
            std::env::set_var("LANGEXTRACT_API_KEY", "from-env");
        }

        let client = GeminiClientBuilder::new().build().unwrap();
        assert_eq!(client.api_key, "from-env");

        unsafe {
            std::env::remove_var("LANGEXTRACT_API_KEY");
        }
    }

    #[test]
    fn explicit_key_and_url_are_used() {
        let client = GeminiClientBuilder::new()
            .api_key("secret")
            .base_url("http://proxy.local/v1beta/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://proxy.local/v1beta");
        assert_eq!(client.api_key, "secret");
    }

    #[test]
    fn request_body_asks_for_json_output() {
        let body = generate_request_body("hello");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn joins_candidate_text_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"extractions\":" }, { "text": " []}" }] }
            }]
        });
        assert_eq!(
            parse_generate_response(&json).unwrap(),
            "{\"extractions\": []}"
        );
    }

    #[test]
    fn reports_block_reason_when_no_candidates() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = parse_generate_response(&json).unwrap_err();
        assert_eq!(err.to_string(), "Gemini API error: SAFETY");
    }

    #[test]
    fn reports_error_message() {
        let json = serde_json::json!({ "error": { "code": 400, "message": "API key not valid" } });
        let err = parse_generate_response(&json).unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }
}

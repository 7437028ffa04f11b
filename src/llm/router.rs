use std::sync::Arc;

use super::{GeminiClientBuilder, LanguageModel, LlmError, OllamaClientBuilder};

/// Dispatches each call to a provider based on the model id.
///
/// Model ids starting with `gemini` go to Gemini; everything else goes to
/// Ollama. The Gemini client is optional so that local-only setups work
/// without an API key; using a Gemini model without one is an error at call
/// time.
pub struct ModelRouter {
    ollama: Arc<dyn LanguageModel>,
    gemini: Option<Arc<dyn LanguageModel>>,
}

impl ModelRouter {
    pub fn new(ollama: Arc<dyn LanguageModel>, gemini: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { ollama, gemini }
    }

    /// Builds both clients from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the Ollama client cannot be built (invalid
    /// `OLLAMA_HOST`). A missing Gemini key only disables Gemini.
    pub fn from_env() -> Result<Self, LlmError> {
        let ollama = OllamaClientBuilder::new().build()?;
        let gemini = match GeminiClientBuilder::new().build() {
            Ok(client) => Some(Arc::new(client) as Arc<dyn LanguageModel>),
            Err(LlmError::MissingApiKey { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(Self::new(Arc::new(ollama), gemini))
    }

    fn provider_for(&self, model: &str) -> Result<&dyn LanguageModel, LlmError> {
        if is_gemini_model(model) {
            self.gemini
                .as_deref()
                .ok_or(LlmError::MissingApiKey {
                    provider: "Gemini",
                    env_var: "GEMINI_API_KEY",
                })
        } else {
            Ok(self.ollama.as_ref())
        }
    }
}

impl LanguageModel for ModelRouter {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        self.provider_for(model)?.generate(model, prompt)
    }
}

fn is_gemini_model(model: &str) -> bool {
    model.to_ascii_lowercase().starts_with("gemini")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl LanguageModel for Named {
        fn generate(&self, _model: &str, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn routes_gemini_ids_to_gemini() {
        let router = ModelRouter::new(Arc::new(Named("ollama")), Some(Arc::new(Named("gemini"))));
        assert_eq!(router.generate("gemini-2.5-pro", "p").unwrap(), "gemini");
        assert_eq!(router.generate("Gemini-2.5-flash", "p").unwrap(), "gemini");
        assert_eq!(router.generate("gemma3:4b", "p").unwrap(), "ollama");
    }

    #[test]
    fn gemini_without_client_reports_missing_key() {
        let router = ModelRouter::new(Arc::new(Named("ollama")), None);
        let err = router.generate("gemini-2.5-flash-lite", "p").unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }
}

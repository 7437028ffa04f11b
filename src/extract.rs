//! Extraction backend.
//!
//! The runner depends only on the [`Extractor`] trait. [`LlmExtractor`] is the
//! shipped implementation: it renders a few-shot prompt per chunk of input,
//! asks a [`LanguageModel`] for a JSON answer, aligns the answer to the source
//! text, and merges several passes when asked to.
mod chunking;
mod prompt;
mod resolver;

use std::sync::Arc;

use thiserror::Error;

use crate::data::{AnnotatedDocument, ExampleData, Extraction};
use crate::llm::{LanguageModel, LlmError};

use chunking::chunk_text;
use prompt::render_prompt;
use resolver::{align, parse_answer};

/// Default maximum number of characters sent to the model per request.
pub const DEFAULT_MAX_CHAR_BUFFER: usize = 1000;

/// Errors produced while extracting.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Model(#[from] LlmError),

    /// The model answered, but not with usable extractions.
    #[error("could not parse model answer for chunk {chunk} (pass {pass}): {message}")]
    Parse {
        pass: usize,
        chunk: usize,
        message: String,
    },

    #[error("invalid extraction request: {0}")]
    InvalidRequest(String),
}

/// Everything one extraction call needs.
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub text: &'a str,
    pub prompt_description: &'a str,
    pub examples: &'a [ExampleData],
    pub model_id: &'a str,
    pub extraction_passes: usize,
}

/// Annotates text with extractions.
pub trait Extractor {
    /// Runs extraction over `request.text`.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError` when the request is invalid or the backend fails.
    fn extract(&self, request: &ExtractRequest<'_>) -> Result<AnnotatedDocument, ExtractError>;
}

/// Extractor backed by a language model.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use lxs::extract::{ExtractRequest, Extractor, LlmExtractor};
/// use lxs::llm::ModelRouter;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = LlmExtractor::new(Arc::new(ModelRouter::from_env()?));
/// let doc = extractor.extract(&ExtractRequest {
///     text: "Patient took 400 mg PO Ibuprofen q4h for two days.",
///     prompt_description: "Extract medication information.",
///     examples: &[],
///     model_id: "gemma3:4b",
///     extraction_passes: 1,
/// })?;
/// println!("{} extractions", doc.extractions.len());
/// # Ok(())
/// # }
/// ```
pub struct LlmExtractor {
    model: Arc<dyn LanguageModel>,
    max_char_buffer: usize,
}

impl LlmExtractor {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            max_char_buffer: DEFAULT_MAX_CHAR_BUFFER,
        }
    }

    /// Sets the maximum chunk size in characters.
    #[must_use]
    pub fn with_max_char_buffer(mut self, max_char_buffer: usize) -> Self {
        self.max_char_buffer = max_char_buffer.max(1);
        self
    }

    /// Runs a single pass over every chunk of the text.
    fn run_pass(
        &self,
        request: &ExtractRequest<'_>,
        pass: usize,
    ) -> Result<Vec<Extraction>, ExtractError> {
        let mut extractions = Vec::new();

        for (chunk_idx, chunk) in chunk_text(request.text, self.max_char_buffer)
            .into_iter()
            .enumerate()
        {
            let prompt = render_prompt(request.prompt_description, request.examples, chunk.text);
            tracing::debug!(pass, chunk = chunk_idx, chars = chunk.text.len(), "prompting model");

            let answer = self.model.generate(request.model_id, &prompt)?;
            let mut found = parse_answer(&answer).map_err(|message| ExtractError::Parse {
                pass,
                chunk: chunk_idx,
                message,
            })?;

            align(chunk.text, &mut found);
            for extraction in &mut found {
                extraction.char_interval = extraction
                    .char_interval
                    .map(|interval| interval.shifted(chunk.char_offset));
                extraction.group_index = Some(chunk_idx);
            }
            extractions.extend(found);
        }

        for (idx, extraction) in extractions.iter_mut().enumerate() {
            extraction.extraction_index = Some(idx + 1);
        }
        Ok(extractions)
    }
}

impl Extractor for LlmExtractor {
    fn extract(&self, request: &ExtractRequest<'_>) -> Result<AnnotatedDocument, ExtractError> {
        if request.extraction_passes == 0 {
            return Err(ExtractError::InvalidRequest(
                "extraction_passes must be at least 1".to_string(),
            ));
        }
        if request.model_id.trim().is_empty() {
            return Err(ExtractError::InvalidRequest("model id is empty".to_string()));
        }

        let mut merged: Vec<Extraction> = Vec::new();
        for pass in 1..=request.extraction_passes {
            let found = self.run_pass(request, pass)?;
            tracing::debug!(pass, found = found.len(), "extraction pass finished");
            if pass == 1 {
                merged = found;
            } else {
                merge_pass(&mut merged, found);
            }
        }

        if request.extraction_passes > 1 {
            // Stable: unaligned extractions keep their relative order at the end.
            merged.sort_by_key(|e| {
                e.char_interval
                    .map_or((1, 0, 0), |i| (0, i.start_pos, i.end_pos))
            });
        }

        Ok(AnnotatedDocument::new(request.text, merged))
    }
}

/// Adds extractions from a later pass that do not collide with earlier ones.
///
/// Aligned extractions are kept only if their interval overlaps nothing
/// already kept. Unaligned extractions are kept unless an earlier one has the
/// same class and text.
fn merge_pass(merged: &mut Vec<Extraction>, later: Vec<Extraction>) {
    for candidate in later {
        let collides = match candidate.char_interval {
            Some(interval) => merged
                .iter()
                .filter_map(|e| e.char_interval)
                .any(|existing| existing.overlaps(&interval)),
            None => merged.iter().any(|e| {
                e.char_interval.is_none()
                    && e.extraction_class == candidate.extraction_class
                    && e.extraction_text == candidate.extraction_text
            }),
        };
        if !collides {
            merged.push(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CharInterval;
    use std::sync::Mutex;

    /// Replays canned answers in order and records the prompts it saw.
    struct ScriptedModel {
        answers: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for ScriptedModel {
        fn generate(&self, _model: &str, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers.lock().unwrap().pop().ok_or(LlmError::Api {
                provider: "test",
                message: "no more answers".to_string(),
            })
        }
    }

    fn request<'a>(text: &'a str, passes: usize) -> ExtractRequest<'a> {
        ExtractRequest {
            text,
            prompt_description: "Extract characters.",
            examples: &[],
            model_id: "test-model",
            extraction_passes: passes,
        }
    }

    #[test]
    fn single_pass_aligns_and_indexes_extractions() {
        let model = Arc::new(ScriptedModel::new(&[
            r#"{"extractions": [{"character": "Juliet"}, {"character": "Romeo"}]}"#,
        ]));
        let extractor = LlmExtractor::new(model.clone());

        let doc = extractor
            .extract(&request("Lady Juliet gazed longingly at the stars, her heart aching for Romeo.", 1))
            .unwrap();

        assert_eq!(doc.extractions.len(), 2);
        assert_eq!(doc.extractions[0].char_interval, Some(CharInterval::new(5, 11)));
        assert_eq!(doc.extractions[0].extraction_index, Some(1));
        assert_eq!(doc.extractions[1].extraction_index, Some(2));
        assert_eq!(doc.extractions[1].group_index, Some(0));
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn chunk_offsets_are_applied() {
        let model = Arc::new(ScriptedModel::new(&[
            r#"{"extractions": [{"word": "alpha"}]}"#,
            r#"{"extractions": [{"word": "gamma"}]}"#,
        ]));
        let extractor = LlmExtractor::new(model).with_max_char_buffer(11);

        let doc = extractor.extract(&request("alpha beta gamma", 1)).unwrap();

        assert_eq!(doc.extractions[0].char_interval, Some(CharInterval::new(0, 5)));
        assert_eq!(doc.extractions[1].char_interval, Some(CharInterval::new(11, 16)));
        assert_eq!(doc.extractions[1].group_index, Some(1));
    }

    #[test]
    fn later_passes_only_add_non_overlapping_extractions() {
        let model = Arc::new(ScriptedModel::new(&[
            r#"{"extractions": [{"character": "Romeo"}]}"#,
            r#"{"extractions": [{"person": "and Romeo"}, {"character": "Juliet"}, {"emotion": "love"}]}"#,
        ]));
        let extractor = LlmExtractor::new(model.clone());

        let doc = extractor.extract(&request("Juliet and Romeo", 2)).unwrap();

        let texts: Vec<&str> = doc.extractions.iter().map(|e| e.extraction_text.as_str()).collect();
        assert_eq!(texts, vec!["Juliet", "Romeo", "love"]);
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[test]
    fn unparseable_answer_is_an_error() {
        let model = Arc::new(ScriptedModel::new(&["sorry, no idea"]));
        let extractor = LlmExtractor::new(model);

        let err = extractor.extract(&request("some text", 1)).unwrap_err();
        assert!(matches!(err, ExtractError::Parse { pass: 1, chunk: 0, .. }));
    }

    #[test]
    fn model_errors_propagate() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let extractor = LlmExtractor::new(model);

        let err = extractor.extract(&request("some text", 1)).unwrap_err();
        assert!(matches!(err, ExtractError::Model(LlmError::Api { .. })));
    }

    #[test]
    fn zero_passes_is_rejected() {
        let extractor = LlmExtractor::new(Arc::new(ScriptedModel::new(&[])));
        assert!(matches!(
            extractor.extract(&request("text", 0)),
            Err(ExtractError::InvalidRequest(_))
        ));
    }

    #[test]
    fn blank_input_yields_empty_document_without_model_calls() {
        let model = Arc::new(ScriptedModel::new(&[]));
        let extractor = LlmExtractor::new(model.clone());

        let doc = extractor.extract(&request("   ", 1)).unwrap();

        assert!(doc.extractions.is_empty());
        assert!(model.prompts.lock().unwrap().is_empty());
    }
}

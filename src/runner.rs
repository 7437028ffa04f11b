use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::artifacts::{ArtifactPaths, artifact_prefix, save_artifacts};
use crate::data::AnnotatedDocument;
use crate::datasets::{DatasetConfig, DatasetRegistry};
use crate::extract::{ExtractRequest, Extractor};

/// Default directory for run artifacts and the outputs site.
pub const DEFAULT_OUTPUT_DIR: &str = "docs";

/// Per-run overrides of a dataset's defaults.
///
/// # Examples
///
/// ```
/// use lxs::runner::RunOptions;
///
/// let options = RunOptions {
///     model_id: Some("gemma3:4b".to_string()),
///     extraction_passes: Some(2),
///     ..Default::default()
/// };
/// assert_eq!(options.output_dir.to_str(), Some("docs"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Model to use instead of the dataset default. Blank counts as unset.
    pub model_id: Option<String>,

    /// Inline input text. Ignored when `input_file` is set; empty counts as
    /// unset.
    pub input_text: Option<String>,

    /// File whose contents are used as input text.
    pub input_file: Option<PathBuf>,

    /// Directory receiving `{prefix}.jsonl` and `{prefix}.html`.
    pub output_dir: PathBuf,

    /// Pass count to use instead of the dataset default.
    pub extraction_passes: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            model_id: None,
            input_text: None,
            input_file: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            extraction_passes: None,
        }
    }
}

/// Result of one dataset run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub dataset: String,
    pub model_id: String,
    pub extraction_passes: usize,
    pub prefix: String,
    pub paths: ArtifactPaths,
    pub document: AnnotatedDocument,
}

/// Executes datasets from a registry against an extraction backend.
///
/// The runner borrows both; it holds no state between runs.
pub struct Runner<'a> {
    registry: &'a DatasetRegistry,
    extractor: &'a dyn Extractor,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a DatasetRegistry, extractor: &'a dyn Extractor) -> Self {
        Self {
            registry,
            extractor,
        }
    }

    /// Runs the dataset registered under `key`.
    ///
    /// Resolves model, input and pass count (overrides first), extracts,
    /// writes the dataset's summary to `out` and saves the artifacts.
    ///
    /// # Errors
    ///
    /// Fails with `RegistryError::NotFound` for an unknown key. Example,
    /// extraction, I/O and write errors are propagated unchanged; nothing is
    /// retried here.
    pub fn run_dataset(
        &self,
        key: &str,
        options: &RunOptions,
        out: &mut dyn Write,
    ) -> Result<RunOutcome> {
        let dataset = self.registry.get(key)?;

        let model_id = options
            .model_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| dataset.default_model_id.clone());
        let extraction_passes = options
            .extraction_passes
            .unwrap_or(dataset.extraction_passes);
        let input_text = resolve_input_text(dataset, options)?;
        let examples = dataset
            .build_examples()
            .with_context(|| format!("Invalid examples in dataset '{}'", dataset.key))?;

        tracing::info!(
            dataset = %dataset.key,
            model = %model_id,
            passes = extraction_passes,
            examples = examples.len(),
            "running dataset"
        );

        let document = self
            .extractor
            .extract(&ExtractRequest {
                text: &input_text,
                prompt_description: &dataset.prompt_description,
                examples: &examples,
                model_id: &model_id,
                extraction_passes,
            })
            .with_context(|| format!("Extraction failed for dataset '{}'", dataset.key))?;

        match dataset.summary {
            Some(kind) => kind.render(&document, &input_text, out)?,
            None => writeln!(out, "Processed dataset '{}'.", dataset.key)?,
        }

        let prefix = artifact_prefix(&dataset.key, &model_id, extraction_passes);
        let paths = save_artifacts(&document, &options.output_dir, &prefix)?;

        Ok(RunOutcome {
            dataset: dataset.key.clone(),
            model_id,
            extraction_passes,
            prefix,
            paths,
            document,
        })
    }
}

/// Input precedence: file, then inline text, then the dataset default.
fn resolve_input_text(dataset: &DatasetConfig, options: &RunOptions) -> Result<String> {
    if let Some(path) = &options.input_file {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }
    Ok(options
        .input_text
        .clone()
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| dataset.default_input_text.clone()))
}

//! Command-line front end shared by every `lxs` binary.
//!
//! `lxs` itself can run any registered dataset. The per-dataset binaries run
//! the same CLI inside an [`EntryPoint`] that only admits their own key.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{DatasetSearchPath, load_dotenv};
use crate::datasets::{DatasetConfig, DatasetRegistry, RegistryError};
use crate::extract::{Extractor, LlmExtractor};
use crate::llm::ModelRouter;
use crate::outputs;
use crate::runner::{DEFAULT_OUTPUT_DIR, RunOptions, Runner};

/// lxs - run extraction datasets and publish JSONL + HTML reports
#[derive(Parser, Debug)]
#[command(name = "lxs")]
#[command(about = "Run extraction datasets and publish JSONL + HTML reports")]
#[command(version)]
pub struct Cli {
    /// Dataset to run. Runs every available dataset when omitted
    #[arg(value_name = "DATASET")]
    dataset: Option<String>,

    /// Dataset to run (same as the positional argument)
    #[arg(long = "dataset", value_name = "KEY")]
    dataset_flag: Option<String>,

    /// Model to use instead of the dataset default
    #[arg(long, value_name = "ID")]
    model_id: Option<String>,

    /// Input text to use instead of the dataset default
    #[arg(long, value_name = "TEXT")]
    input_text: Option<String>,

    /// Read input text from a file (takes precedence over --input-text)
    #[arg(long, value_name = "PATH")]
    input_file: Option<PathBuf>,

    /// Directory for artifacts and the outputs site
    #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Number of extraction passes instead of the dataset default
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    extraction_passes: Option<u32>,

    /// Directory of dataset JSON files to load instead of the defaults
    #[arg(long, value_name = "DIR")]
    datasets_dir: Option<PathBuf>,

    /// List available datasets and exit
    #[arg(long)]
    list_datasets: bool,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            model_id: self.model_id.clone(),
            input_text: self.input_text.clone(),
            input_file: self.input_file.clone(),
            output_dir: self.output_dir.clone(),
            extraction_passes: self.extraction_passes.map(|n| n as usize),
        }
    }

    /// Resolves the dataset named by the positional argument and `--dataset`.
    fn requested_dataset(&self) -> Result<Option<String>> {
        match (&self.dataset, &self.dataset_flag) {
            (Some(positional), Some(flag)) if positional != flag => Err(UsageError(format!(
                "Conflicting dataset arguments: '{}' and --dataset '{}'",
                positional, flag
            ))
            .into()),
            (positional, flag) => Ok(positional.clone().or_else(|| flag.clone())),
        }
    }
}

/// An error caused by how the program was invoked.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UsageError(String);

/// Invalid key restriction for an entry point.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("An entry point needs at least one allowed dataset")]
    NoKeys,

    #[error("Default dataset '{default_key}' is not one of the allowed datasets: {allowed}")]
    DefaultNotAllowed { default_key: String, allowed: String },
}

/// Allowed keys and the key run when none is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scope {
    keys: Vec<String>,
    default_key: String,
}

/// Which datasets a binary may run.
///
/// ```
/// use lxs::cli::EntryPoint;
///
/// let entry = EntryPoint::restricted(&["a", "b"], None).unwrap();
/// assert_eq!(entry.default_key(), Some("a"));
/// assert!(EntryPoint::restricted(&["a"], Some("c")).is_err());
/// assert_eq!(EntryPoint::all().allowed_keys(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryPoint {
    scope: Option<Scope>,
}

impl EntryPoint {
    /// Every registered dataset; running without a dataset runs all of them.
    pub fn all() -> Self {
        Self::default()
    }

    /// Exactly one dataset, which is also the default.
    pub fn single(key: &str) -> Self {
        Self {
            scope: Some(Scope {
                keys: vec![key.to_string()],
                default_key: key.to_string(),
            }),
        }
    }

    /// `keys` in the given order. The default falls back to the first key.
    pub fn restricted(keys: &[&str], default_key: Option<&str>) -> Result<Self, ScopeError> {
        let first = *keys.first().ok_or(ScopeError::NoKeys)?;
        let default_key = default_key.unwrap_or(first);
        if !keys.contains(&default_key) {
            return Err(ScopeError::DefaultNotAllowed {
                default_key: default_key.to_string(),
                allowed: keys.join(", "),
            });
        }
        Ok(Self {
            scope: Some(Scope {
                keys: keys.iter().map(|k| k.to_string()).collect(),
                default_key: default_key.to_string(),
            }),
        })
    }

    /// `None` when every registered dataset is allowed.
    pub fn allowed_keys(&self) -> Option<&[String]> {
        self.scope.as_ref().map(|s| s.keys.as_slice())
    }

    pub fn default_key(&self) -> Option<&str> {
        self.scope.as_ref().map(|s| s.default_key.as_str())
    }

    /// Datasets this entry point may run, in listing order.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if an allowed key is not registered.
    pub fn datasets<'r>(
        &self,
        registry: &'r DatasetRegistry,
    ) -> Result<Vec<&'r DatasetConfig>, RegistryError> {
        match &self.scope {
            None => Ok(registry.iter().collect()),
            Some(scope) => scope.keys.iter().map(|key| registry.get(key)).collect(),
        }
    }

    /// Returns the keys to run: the requested one, the default, or every
    /// registered dataset.
    pub fn select(&self, registry: &DatasetRegistry, requested: Option<String>) -> Result<Vec<String>> {
        match (&self.scope, requested) {
            (Some(scope), Some(key)) if !scope.keys.contains(&key) => Err(UsageError(format!(
                "Dataset '{}' is not available here; choose from: {}",
                key,
                scope.keys.join(", ")
            ))
            .into()),
            (_, Some(key)) => {
                registry.get(&key)?;
                Ok(vec![key])
            }
            (Some(scope), None) => {
                registry.get(&scope.default_key)?;
                Ok(vec![scope.default_key.clone()])
            }
            (None, None) if registry.is_empty() => Err(UsageError(
                "No datasets found; pass --datasets-dir or add JSON files to ./datasets"
                    .to_string(),
            )
            .into()),
            (None, None) => Ok(registry.list_keys().into_iter().map(String::from).collect()),
        }
    }
}

/// Parses arguments, runs and exits with 1 for user errors, 2 otherwise.
pub fn main_with(entry: EntryPoint) {
    load_dotenv();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(&cli, &entry) {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr so stdout only carries summaries and saved paths.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lxs=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are unknown dataset keys and conflicting or unusable
/// arguments. Everything else (I/O, model calls, invalid dataset files) is
/// internal.
pub fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<UsageError>()
            || matches!(
                cause.downcast_ref::<RegistryError>(),
                Some(RegistryError::NotFound(_))
            )
    })
}

fn run(cli: &Cli, entry: &EntryPoint) -> Result<()> {
    let requested = cli.requested_dataset()?;

    let search = DatasetSearchPath::discover(cli.datasets_dir.as_deref());
    let registry = DatasetRegistry::load(&search).context("Failed to load datasets")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.list_datasets {
        return list_datasets(&registry, entry, &mut out);
    }

    let keys = entry.select(&registry, requested)?;

    let model = ModelRouter::from_env().context("Failed to configure language model clients")?;
    let extractor = LlmExtractor::new(Arc::new(model));

    execute_runs(&registry, &extractor, &keys, &cli.run_options(), &mut out)
}

fn list_datasets(registry: &DatasetRegistry, entry: &EntryPoint, out: &mut dyn Write) -> Result<()> {
    for dataset in entry.datasets(registry)? {
        writeln!(out, "{}: {}", dataset.key, dataset.title)?;
    }
    Ok(())
}

/// Runs `keys` in order, then rebuilds the outputs site.
///
/// Separated from `run` so tests can supply their own extractor.
fn execute_runs(
    registry: &DatasetRegistry,
    extractor: &dyn Extractor,
    keys: &[String],
    options: &RunOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let runner = Runner::new(registry, extractor);
    let tagged = keys.len() > 1;

    for key in keys {
        let tag = if tagged {
            format!("[{}] ", key)
        } else {
            String::new()
        };
        if tagged {
            let title = registry.get(key).map(|d| d.title.as_str()).unwrap_or(key.as_str());
            writeln!(out, "{}Running {}", tag, title)?;
        }

        let outcome = runner.run_dataset(key, options, out)?;

        writeln!(
            out,
            "{}Saved structured output to: {}",
            tag,
            outcome.paths.jsonl.display()
        )?;
        writeln!(
            out,
            "{}Saved visualization to: {}",
            tag,
            outcome.paths.html.display()
        )?;
    }

    outputs::write_site(&options.output_dir).context("Failed to rebuild outputs site")?;
    writeln!(
        out,
        "Updated outputs index: {}",
        options.output_dir.join(outputs::INDEX_PAGE).display()
    )?;
    Ok(())
}

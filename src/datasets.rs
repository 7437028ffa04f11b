//! Dataset registry.
//!
//! A dataset bundles a prompt, few-shot examples and default run parameters
//! under a unique key. Definitions are JSON, loaded from the first source of a
//! [`DatasetSearchPath`] that yields any entries.

mod examples;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{DatasetSearchPath, DatasetSource};
use crate::data::ExampleData;
use crate::summary::SummaryKind;

pub use examples::{ExampleError, build_examples};

/// Sample datasets compiled into the binary, as (file stem, JSON).
const BUILTIN_DATASETS: [(&str, &str); 3] = [
    (
        "romeo_quickstart",
        include_str!("../datasets/romeo_quickstart.json"),
    ),
    (
        "medication_ner",
        include_str!("../datasets/medication_ner.json"),
    ),
    (
        "medication_relationship",
        include_str!("../datasets/medication_relationship.json"),
    ),
];

/// Errors raised while loading or querying datasets.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown dataset: {0}")]
    NotFound(String),

    #[error("dataset entry {index} in {origin} has no key")]
    MissingKey { origin: String, index: usize },

    #[error("duplicate dataset key '{key}' in {origin}")]
    DuplicateKey { key: String, origin: String },

    #[error(
        "dataset '{key}' uses unknown summary type '{name}' (expected basic, relationship or none)"
    )]
    UnknownSummary { key: String, name: String },

    #[error("dataset '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("failed to parse {origin}")]
    Parse {
        origin: String,
        #[source]
        error: serde_json::Error,
    },
}

/// A runnable extraction scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetConfig {
    pub key: String,
    pub title: String,
    pub description: String,
    pub prompt_description: String,
    pub default_input_text: String,
    pub default_model_id: String,
    /// Default number of extraction passes, at least 1.
    pub extraction_passes: usize,
    pub summary: Option<SummaryKind>,
    /// Raw example JSON; see [`DatasetConfig::build_examples`].
    pub examples: Vec<Value>,
}

impl DatasetConfig {
    /// Builds the few-shot examples for this dataset.
    ///
    /// # Errors
    ///
    /// Returns `ExampleError` if an example lacks a required field.
    pub fn build_examples(&self) -> Result<Vec<ExampleData>, ExampleError> {
        build_examples(&self.examples)
    }
}

/// On-disk shape of a dataset definition.
#[derive(Debug, Deserialize)]
struct RawDataset {
    key: Option<String>,
    title: Option<String>,
    #[serde(default)]
    description: String,
    prompt_description: String,
    default_input_text: String,
    default_model_id: String,
    extraction_passes: Option<usize>,
    summary_type: Option<String>,
    #[serde(default)]
    examples: Vec<Value>,
}

impl RawDataset {
    /// Validates the entry, using `fallback_key` when it has no `key`.
    fn into_config(self, fallback_key: Option<&str>) -> Result<Option<DatasetConfig>, RegistryError> {
        let Some(key) = self
            .key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| fallback_key.map(str::to_string))
        else {
            return Ok(None);
        };

        let summary = match self.summary_type.as_deref() {
            None | Some("none") => None,
            Some(name) => Some(name.parse::<SummaryKind>().map_err(|_| {
                RegistryError::UnknownSummary {
                    key: key.clone(),
                    name: name.to_string(),
                }
            })?),
        };

        let extraction_passes = self.extraction_passes.unwrap_or(1);
        if extraction_passes == 0 {
            return Err(RegistryError::Invalid {
                key,
                message: "extraction_passes must be at least 1".to_string(),
            });
        }

        Ok(Some(DatasetConfig {
            title: self.title.unwrap_or_else(|| key.clone()),
            key,
            description: self.description,
            prompt_description: self.prompt_description,
            default_input_text: self.default_input_text,
            default_model_id: self.default_model_id,
            extraction_passes,
            summary,
            examples: self.examples,
        }))
    }
}

/// In-memory mapping of dataset key to configuration, in load order.
///
/// # Examples
///
/// ```
/// use lxs::datasets::DatasetRegistry;
///
/// let registry = DatasetRegistry::builtin().expect("built-in datasets are valid");
/// let dataset = registry.get("medication_ner").unwrap();
/// assert_eq!(dataset.key, "medication_ner");
/// ```
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    datasets: Vec<DatasetConfig>,
    origin: String,
}

impl DatasetRegistry {
    /// Loads datasets from the first source in `search` that yields entries.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` for unreadable or malformed sources, entries
    /// without a key, duplicate keys, unknown summary types and invalid pass
    /// counts. A source that fails is an error; it is not skipped.
    pub fn load(search: &DatasetSearchPath) -> Result<Self, RegistryError> {
        for source in search.sources() {
            let datasets = load_source(source)?;
            if datasets.is_empty() {
                tracing::debug!(source = %source.describe(), "no datasets found");
                continue;
            }
            tracing::info!(
                source = %source.describe(),
                count = datasets.len(),
                "loaded datasets"
            );
            return Ok(Self {
                datasets,
                origin: source.describe(),
            });
        }

        Ok(Self {
            datasets: Vec::new(),
            origin: "nowhere".to_string(),
        })
    }

    /// Loads only the datasets compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if a built-in definition is invalid.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::load(&DatasetSearchPath::new(vec![DatasetSource::Builtin]))
    }

    /// Returns the dataset registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for unknown keys.
    pub fn get(&self, key: &str) -> Result<&DatasetConfig, RegistryError> {
        self.datasets
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    /// Returns dataset keys in load order.
    pub fn list_keys(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.key.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetConfig> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Describes the source the datasets were loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn load_source(source: &DatasetSource) -> Result<Vec<DatasetConfig>, RegistryError> {
    let origin = source.describe();
    let entries = match source {
        DatasetSource::Directory { path, required } => {
            if !path.is_dir() {
                if *required {
                    return Err(RegistryError::Io {
                        path: path.clone(),
                        error: io::Error::new(io::ErrorKind::NotFound, "datasets directory not found"),
                    });
                }
                return Ok(Vec::new());
            }
            load_directory(path)?
        }
        DatasetSource::AggregatedFile(path) => {
            if !path.is_file() {
                return Ok(Vec::new());
            }
            load_aggregated(path)?
        }
        DatasetSource::Builtin => BUILTIN_DATASETS
            .iter()
            .map(|(stem, json)| {
                let raw = parse_raw(json, &format!("built-in dataset '{}'", stem))?;
                Ok((raw, Some(stem.to_string())))
            })
            .collect::<Result<Vec<_>, RegistryError>>()?,
    };

    normalize(entries, &origin)
}

/// Reads every `*.json` file in `dir`, in file-name order.
fn load_directory(dir: &Path) -> Result<Vec<(RawDataset, Option<String>)>, RegistryError> {
    let io_error = |error| RegistryError::Io {
        path: dir.to_path_buf(),
        error,
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(io_error)?;
    paths.retain(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("json"));
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let content = fs::read_to_string(&path).map_err(|error| RegistryError::Io {
                path: path.clone(),
                error,
            })?;
            let raw = parse_raw(&content, &path.display().to_string())?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string);
            Ok((raw, stem))
        })
        .collect()
}

/// Reads a legacy aggregated file: an array of entries or a key → entry map.
fn load_aggregated(path: &Path) -> Result<Vec<(RawDataset, Option<String>)>, RegistryError> {
    let origin = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|error| RegistryError::Io {
        path: path.to_path_buf(),
        error,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|error| RegistryError::Parse {
        origin: origin.clone(),
        error,
    })?;

    let entry = |value: Value, label: String| {
        serde_json::from_value::<RawDataset>(value).map_err(|error| RegistryError::Parse {
            origin: format!("{} ({})", origin, label),
            error,
        })
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| Ok((entry(item, format!("entry {}", idx + 1))?, None)))
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, item)| Ok((entry(item, format!("entry '{}'", key))?, Some(key))))
            .collect(),
        _ => Err(RegistryError::Parse {
            origin: origin.clone(),
            error: serde::de::Error::custom("expected a JSON array or object of datasets"),
        }),
    }
}

fn parse_raw(json: &str, origin: &str) -> Result<RawDataset, RegistryError> {
    serde_json::from_str(json).map_err(|error| RegistryError::Parse {
        origin: origin.to_string(),
        error,
    })
}

/// Resolves keys and rejects duplicates, preserving order.
fn normalize(
    entries: Vec<(RawDataset, Option<String>)>,
    origin: &str,
) -> Result<Vec<DatasetConfig>, RegistryError> {
    let mut seen = HashSet::new();
    let mut datasets = Vec::with_capacity(entries.len());

    for (idx, (raw, fallback_key)) in entries.into_iter().enumerate() {
        let config = raw
            .into_config(fallback_key.as_deref())?
            .ok_or_else(|| RegistryError::MissingKey {
                origin: origin.to_string(),
                index: idx + 1,
            })?;

        if !seen.insert(config.key.clone()) {
            return Err(RegistryError::DuplicateKey {
                key: config.key,
                origin: origin.to_string(),
            });
        }
        datasets.push(config);
    }
    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_datasets_load_in_declared_order() {
        let registry = DatasetRegistry::builtin().unwrap();
        assert_eq!(
            registry.list_keys(),
            vec!["romeo_quickstart", "medication_ner", "medication_relationship"]
        );
        assert_eq!(registry.origin(), "built-in datasets");
    }

    #[test]
    fn get_returns_config_with_matching_key() {
        let registry = DatasetRegistry::builtin().unwrap();
        for key in registry.list_keys() {
            assert_eq!(registry.get(key).unwrap().key, key);
        }
    }

    #[test]
    fn get_unknown_key_is_not_found() {
        let registry = DatasetRegistry::builtin().unwrap();
        let err = registry.get("no_such_dataset").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(ref k) if k == "no_such_dataset"));
        assert_eq!(err.to_string(), "Unknown dataset: no_such_dataset");
    }

    #[test]
    fn builtin_summaries_and_examples_resolve() {
        let registry = DatasetRegistry::builtin().unwrap();

        let relationship = registry.get("medication_relationship").unwrap();
        assert_eq!(relationship.summary, Some(SummaryKind::Relationship));
        assert_eq!(relationship.build_examples().unwrap()[0].extractions.len(), 7);

        let romeo = registry.get("romeo_quickstart").unwrap();
        assert_eq!(romeo.summary, Some(SummaryKind::Basic));
        assert_eq!(romeo.default_model_id, "gemini-2.5-flash-lite");
        assert_eq!(romeo.extraction_passes, 1);
    }

    fn raw(json: &str) -> RawDataset {
        serde_json::from_str(json).unwrap()
    }

    const MINIMAL: &str = r#"{
        "prompt_description": "p",
        "default_input_text": "t",
        "default_model_id": "m"
    }"#;

    #[test]
    fn missing_optional_fields_get_defaults() {
        let config = raw(MINIMAL).into_config(Some("from_file")).unwrap().unwrap();
        assert_eq!(config.key, "from_file");
        assert_eq!(config.title, "from_file");
        assert_eq!(config.description, "");
        assert_eq!(config.extraction_passes, 1);
        assert_eq!(config.summary, None);
        assert!(config.examples.is_empty());
    }

    #[test]
    fn entry_without_any_key_resolves_to_none() {
        assert!(raw(MINIMAL).into_config(None).unwrap().is_none());
    }

    #[test]
    fn explicit_none_summary_is_accepted() {
        let json = r#"{"key": "k", "summary_type": "none", "prompt_description": "p",
                       "default_input_text": "t", "default_model_id": "m"}"#;
        assert_eq!(raw(json).into_config(None).unwrap().unwrap().summary, None);
    }

    #[test]
    fn unknown_summary_type_fails_at_load() {
        let json = r#"{"key": "k", "summary_type": "fancy", "prompt_description": "p",
                       "default_input_text": "t", "default_model_id": "m"}"#;
        let err = raw(json).into_config(None).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSummary { ref name, .. } if name == "fancy"));
    }

    #[test]
    fn zero_passes_is_invalid() {
        let json = r#"{"key": "k", "extraction_passes": 0, "prompt_description": "p",
                       "default_input_text": "t", "default_model_id": "m"}"#;
        assert!(matches!(
            raw(json).into_config(None),
            Err(RegistryError::Invalid { .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let entries = vec![
            (raw(MINIMAL), Some("same".to_string())),
            (raw(MINIMAL), Some("same".to_string())),
        ];
        assert!(matches!(
            normalize(entries, "test"),
            Err(RegistryError::DuplicateKey { ref key, .. }) if key == "same"
        ));
    }
}

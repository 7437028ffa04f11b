//! Runtime configuration: where datasets come from and environment setup.
//!
//! Runtime settings are environment variables and CLI flags. `.env` files
//! are honored via `dotenvy`.

use std::path::{Path, PathBuf};

/// Environment variable naming an explicit datasets directory.
pub const DATASETS_DIR_ENV: &str = "LXS_DATASETS_DIR";

/// One place the registry may load dataset definitions from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    /// A directory holding one `*.json` file per dataset.
    ///
    /// When `required` is set, a missing directory is an error instead of
    /// being skipped.
    Directory { path: PathBuf, required: bool },
    /// A single JSON file holding every dataset, as an array or a
    /// key → entry object.
    AggregatedFile(PathBuf),
    /// The sample datasets compiled into the binary.
    Builtin,
}

impl DatasetSource {
    pub fn describe(&self) -> String {
        match self {
            DatasetSource::Directory { path, .. } => format!("directory {}", path.display()),
            DatasetSource::AggregatedFile(path) => format!("file {}", path.display()),
            DatasetSource::Builtin => "built-in datasets".to_string(),
        }
    }
}

/// Ordered list of dataset sources; the first one yielding entries wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSearchPath {
    sources: Vec<DatasetSource>,
}

impl DatasetSearchPath {
    pub fn new(sources: Vec<DatasetSource>) -> Self {
        Self { sources }
    }

    /// Builds the default search path.
    ///
    /// In priority order:
    /// 1. `explicit_dir`, else `$LXS_DATASETS_DIR` (required to exist)
    /// 2. `./datasets/`
    /// 3. `{config_dir}/lxs/datasets/` (legacy location)
    /// 4. `./datasets.json` (legacy aggregated file)
    /// 5. built-in datasets
    pub fn discover(explicit_dir: Option<&Path>) -> Self {
        let mut sources = Vec::new();

        let explicit = explicit_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(DATASETS_DIR_ENV).map(PathBuf::from));
        if let Some(path) = explicit {
            sources.push(DatasetSource::Directory {
                path,
                required: true,
            });
        }

        sources.push(DatasetSource::Directory {
            path: PathBuf::from("datasets"),
            required: false,
        });
        if let Some(path) = legacy_datasets_dir() {
            sources.push(DatasetSource::Directory {
                path,
                required: false,
            });
        }
        sources.push(DatasetSource::AggregatedFile(PathBuf::from("datasets.json")));
        sources.push(DatasetSource::Builtin);

        Self { sources }
    }

    pub fn sources(&self) -> &[DatasetSource] {
        &self.sources
    }
}

/// Gets the legacy per-user datasets directory.
///
/// Returns `{config_dir}/lxs/datasets` where `config_dir` is:
/// - Linux: `~/.config`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
pub fn legacy_datasets_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lxs").join("datasets"))
}

/// Loads a `.env` file from the working directory or its parents, if any.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
    }
}

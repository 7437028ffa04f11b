pub mod artifacts;
pub mod cli;
pub mod config;
pub mod data;
pub mod datasets;
pub mod extract;
pub mod llm;
pub mod outputs;
pub mod runner;
pub mod summary;
pub mod visualize;

pub use data::{AnnotatedDocument, ExampleData, Extraction};
pub use datasets::{DatasetConfig, DatasetRegistry, RegistryError};
pub use extract::{ExtractRequest, Extractor, LlmExtractor};
pub use runner::{RunOptions, RunOutcome, Runner};
pub use summary::SummaryKind;

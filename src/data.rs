//! Core data types shared by the extractor, the artifact writer and the viewers.
//!
//! The JSON shape of these types is the JSONL artifact schema: one
//! `AnnotatedDocument` per line, optional fields omitted when absent.
mod document;
mod example;
mod extraction;

pub use document::AnnotatedDocument;
pub use example::ExampleData;
pub use extraction::{AlignmentStatus, AttributeValue, CharInterval, Extraction};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Extraction;

/// Input text together with the extractions found in it.
///
/// This is the unit written to JSONL artifacts, one document per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    #[serde(default)]
    pub extractions: Vec<Extraction>,
    pub text: String,
    #[serde(default = "generate_document_id")]
    pub document_id: String,
}

impl AnnotatedDocument {
    /// Creates a document with a freshly generated `doc_xxxxxxxx` id.
    pub fn new(text: impl Into<String>, extractions: Vec<Extraction>) -> Self {
        Self {
            extractions,
            text: text.into(),
            document_id: generate_document_id(),
        }
    }

    /// Extractions that carry a character interval, ordered by start position.
    pub fn aligned_extractions(&self) -> Vec<&Extraction> {
        let mut aligned: Vec<&Extraction> = self
            .extractions
            .iter()
            .filter(|e| e.char_interval.is_some())
            .collect();
        aligned.sort_by_key(|e| e.char_interval.map(|i| (i.start_pos, i.end_pos)));
        aligned
    }
}

fn generate_document_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("doc_{}", &id[..8])
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open character range `[start_pos, end_pos)` into a document's text.
///
/// Positions count Unicode scalar values, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharInterval {
    pub start_pos: usize,
    pub end_pos: usize,
}

impl CharInterval {
    pub fn new(start_pos: usize, end_pos: usize) -> Self {
        Self { start_pos, end_pos }
    }

    /// Returns the interval moved right by `offset` characters.
    pub fn shifted(self, offset: usize) -> Self {
        Self {
            start_pos: self.start_pos + offset,
            end_pos: self.end_pos + offset,
        }
    }

    /// Returns `true` if both intervals share at least one character.
    pub fn overlaps(&self, other: &CharInterval) -> bool {
        self.start_pos < other.end_pos && other.start_pos < self.end_pos
    }
}

/// How an extraction's text was located in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    /// Found verbatim.
    MatchExact,
    /// Found after case folding.
    MatchFuzzy,
    /// Span covers only part of the extraction text. Read from JSONL written
    /// by other tools; alignment here never produces it.
    MatchLesser,
    /// Span extends past the extraction text. Read-only, like `MatchLesser`.
    MatchGreater,
}

/// An attribute value attached to an extraction.
///
/// Models usually answer with plain strings, but lists of strings are
/// accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Returns the value when it is a single string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::List(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{}", s),
            AttributeValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// One annotated span: a class label, the literal text, and optional context.
///
/// # Examples
///
/// ```
/// use lxs::data::Extraction;
///
/// let extraction = Extraction::new("medication", "Aspirin")
///     .with_attribute("medication_group", "Aspirin");
///
/// assert_eq!(extraction.attribute_text("medication_group"), Some("Aspirin"));
/// assert!(extraction.char_interval.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub extraction_class: String,
    pub extraction_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_interval: Option<CharInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_status: Option<AlignmentStatus>,
    /// 1-based position of this extraction within the model's answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_index: Option<usize>,
    /// Index of the chunk the extraction came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, AttributeValue>>,
}

impl Extraction {
    /// Creates an extraction with no position and no attributes.
    pub fn new(extraction_class: impl Into<String>, extraction_text: impl Into<String>) -> Self {
        Self {
            extraction_class: extraction_class.into(),
            extraction_text: extraction_text.into(),
            char_interval: None,
            alignment_status: None,
            extraction_index: None,
            group_index: None,
            description: None,
            attributes: None,
        }
    }

    /// Adds (or replaces) one attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Sets the character interval.
    pub fn with_char_interval(mut self, start_pos: usize, end_pos: usize) -> Self {
        self.char_interval = Some(CharInterval::new(start_pos, end_pos));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.as_ref().and_then(|attrs| attrs.get(name))
    }

    /// Returns a string attribute, treating empty strings as absent.
    pub fn attribute_text(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(AttributeValue::as_text)
            .filter(|s| !s.is_empty())
    }
}

//! Few-shot example construction from dataset JSON.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::data::{AttributeValue, ExampleData, Extraction};

/// Errors raised while turning raw example JSON into [`ExampleData`].
///
/// Positions are 1-based to match how people count entries in a file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExampleError {
    #[error("example {example}: missing required field '{field}'")]
    MissingExampleField { example: usize, field: &'static str },

    #[error("example {example}, extraction {extraction}: missing required field '{field}'")]
    MissingExtractionField {
        example: usize,
        extraction: usize,
        field: &'static str,
    },

    #[error("example {example}: {message}")]
    Malformed { example: usize, message: String },
}

/// Builds ordered few-shot examples from a JSON list of
/// `{text, extractions: [{extraction_class, extraction_text, attributes?}]}`.
///
/// # Errors
///
/// Returns `ExampleError` when a required field is absent or not a string.
pub fn build_examples(raw: &[Value]) -> Result<Vec<ExampleData>, ExampleError> {
    raw.iter()
        .enumerate()
        .map(|(idx, value)| build_example(idx + 1, value))
        .collect()
}

fn build_example(example: usize, value: &Value) -> Result<ExampleData, ExampleError> {
    let obj = value.as_object().ok_or_else(|| ExampleError::Malformed {
        example,
        message: "expected a JSON object".to_string(),
    })?;

    let text = obj
        .get("text")
        .and_then(Value::as_str)
        .ok_or(ExampleError::MissingExampleField {
            example,
            field: "text",
        })?;

    let extractions = match obj.get("extractions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| build_extraction(example, idx + 1, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ExampleError::Malformed {
                example,
                message: "'extractions' must be a list".to_string(),
            });
        }
    };

    Ok(ExampleData::new(text, extractions))
}

fn build_extraction(
    example: usize,
    extraction: usize,
    value: &Value,
) -> Result<Extraction, ExampleError> {
    let field = |name: &'static str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .ok_or(ExampleError::MissingExtractionField {
                example,
                extraction,
                field: name,
            })
    };

    let mut built = Extraction::new(field("extraction_class")?, field("extraction_text")?);
    if let Some(Value::Object(attrs)) = value.get("attributes") {
        let attributes: BTreeMap<String, AttributeValue> = attrs
            .iter()
            .map(|(name, value)| (name.clone(), attribute_value(value)))
            .collect();
        if !attributes.is_empty() {
            built.attributes = Some(attributes);
        }
    }
    Ok(built)
}

fn attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::Text(s.clone()),
        Value::Array(items) => AttributeValue::List(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        other => AttributeValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_examples_in_order_with_attributes() {
        let raw = vec![json!({
            "text": "Patient takes Aspirin 100mg daily.",
            "extractions": [
                {"extraction_class": "medication", "extraction_text": "Aspirin",
                 "attributes": {"medication_group": "Aspirin"}},
                {"extraction_class": "dosage", "extraction_text": "100mg"}
            ]
        })];

        let examples = build_examples(&raw).unwrap();

        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].text, "Patient takes Aspirin 100mg daily.");
        assert_eq!(examples[0].extractions[0].extraction_class, "medication");
        assert_eq!(
            examples[0].extractions[0].attribute_text("medication_group"),
            Some("Aspirin")
        );
        assert_eq!(examples[0].extractions[1].extraction_text, "100mg");
        assert!(examples[0].extractions[1].attributes.is_none());
    }

    #[test]
    fn missing_extraction_text_is_a_key_error() {
        let raw = vec![json!({
            "text": "t",
            "extractions": [
                {"extraction_class": "route", "extraction_text": "IV"},
                {"extraction_class": "route"}
            ]
        })];

        assert_eq!(
            build_examples(&raw),
            Err(ExampleError::MissingExtractionField {
                example: 1,
                extraction: 2,
                field: "extraction_text"
            })
        );
    }

    #[test]
    fn missing_extraction_class_is_a_key_error() {
        let raw = vec![json!({"text": "t", "extractions": [{"extraction_text": "IV"}]})];
        let err = build_examples(&raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            "example 1, extraction 1: missing required field 'extraction_class'"
        );
    }

    #[test]
    fn missing_text_is_a_key_error() {
        let raw = vec![json!({"extractions": []})];
        assert_eq!(
            build_examples(&raw),
            Err(ExampleError::MissingExampleField {
                example: 1,
                field: "text"
            })
        );
    }

    #[test]
    fn non_string_attribute_values_are_stringified() {
        let raw = vec![json!({
            "text": "t",
            "extractions": [{"extraction_class": "dose", "extraction_text": "2",
                             "attributes": {"count": 2, "forms": ["tablet", 5]}}]
        })];

        let examples = build_examples(&raw).unwrap();
        let extraction = &examples[0].extractions[0];
        assert_eq!(extraction.attribute_text("count"), Some("2"));
        assert_eq!(
            extraction.attribute("forms"),
            Some(&AttributeValue::List(vec!["tablet".to_string(), "5".to_string()]))
        );
    }

    #[test]
    fn examples_without_extractions_are_allowed() {
        let examples = build_examples(&[json!({"text": "nothing to see"})]).unwrap();
        assert!(examples[0].extractions.is_empty());
    }
}

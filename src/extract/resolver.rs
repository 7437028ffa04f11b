//! Turns a raw model answer into positioned extractions.

use std::collections::BTreeMap;

use serde_json::Value;

use super::prompt::ATTRIBUTE_SUFFIX;
use crate::data::{AlignmentStatus, AttributeValue, CharInterval, Extraction};

/// Parses a model answer into extractions, in answer order.
///
/// Accepts the class-keyed answer format, the explicit
/// `{"extraction_class", "extraction_text", "attributes"}` format, a bare
/// array of either, and answers wrapped in prose or markdown fences.
pub(crate) fn parse_answer(response: &str) -> Result<Vec<Extraction>, String> {
    let json = extract_json(response).ok_or("no JSON found in model answer")?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| format!("failed to parse JSON: {}", e))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("extractions") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err("'extractions' is not an array".to_string()),
            None => return Err("missing 'extractions' field".to_string()),
        },
        _ => return Err("expected a JSON object or array".to_string()),
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| parse_item(item).map_err(|e| format!("item {}: {}", idx + 1, e)))
        .collect()
}

/// Finds the outermost JSON object or array in a model answer.
///
/// Handles markdown code fences and explanatory text around the JSON.
fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;

    (start <= end).then(|| &trimmed[start..=end])
}

fn parse_item(item: &Value) -> Result<Extraction, String> {
    let obj = item.as_object().ok_or("expected an object")?;

    if let Some(class) = obj.get("extraction_class") {
        let class = scalar_text(class).ok_or("'extraction_class' must be a string")?;
        let text = obj
            .get("extraction_text")
            .and_then(scalar_text)
            .ok_or("missing 'extraction_text'")?;
        let mut extraction = Extraction::new(class, text);
        extraction.attributes = obj.get("attributes").and_then(parse_attributes);
        return Ok(extraction);
    }

    let (class, text) = obj
        .iter()
        .find(|(key, _)| !key.ends_with(ATTRIBUTE_SUFFIX))
        .ok_or("no extraction class key")?;
    let text = scalar_text(text).ok_or_else(|| format!("value of '{}' must be a string", class))?;

    let mut extraction = Extraction::new(class.clone(), text);
    extraction.attributes = obj
        .get(&format!("{}{}", class, ATTRIBUTE_SUFFIX))
        .and_then(parse_attributes);
    Ok(extraction)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_attributes(value: &Value) -> Option<BTreeMap<String, AttributeValue>> {
    let obj = value.as_object()?;
    let attrs: BTreeMap<String, AttributeValue> = obj
        .iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Null => return None,
                Value::Array(items) => {
                    AttributeValue::List(items.iter().filter_map(scalar_text).collect())
                }
                other => AttributeValue::Text(scalar_text(other).unwrap_or_else(|| other.to_string())),
            };
            Some((name.clone(), value))
        })
        .collect();
    (!attrs.is_empty()).then_some(attrs)
}

/// Locates extractions in `source`, filling `char_interval` and
/// `alignment_status`.
///
/// Matching prefers positions after the previous match so repeated phrases
/// are assigned in order of appearance. Exact matches win over
/// case-insensitive ones; extractions that are not found stay unaligned.
pub(crate) fn align(source: &str, extractions: &mut [Extraction]) {
    let haystack: Vec<char> = source.chars().collect();
    let folded: Vec<char> = haystack.iter().map(|c| fold(*c)).collect();
    let mut cursor = 0;

    for extraction in extractions.iter_mut() {
        let needle: Vec<char> = extraction.extraction_text.chars().collect();
        if needle.is_empty() {
            continue;
        }
        let folded_needle: Vec<char> = needle.iter().map(|c| fold(*c)).collect();

        let found = find_from(&haystack, &needle, cursor)
            .map(|pos| (pos, AlignmentStatus::MatchExact))
            .or_else(|| find_from(&folded, &folded_needle, cursor).map(|pos| (pos, AlignmentStatus::MatchFuzzy)))
            .or_else(|| find_from(&haystack, &needle, 0).map(|pos| (pos, AlignmentStatus::MatchExact)))
            .or_else(|| find_from(&folded, &folded_needle, 0).map(|pos| (pos, AlignmentStatus::MatchFuzzy)));

        if let Some((start, status)) = found {
            let end = start + needle.len();
            extraction.char_interval = Some(CharInterval::new(start, end));
            extraction.alignment_status = Some(status);
            cursor = end;
        } else {
            tracing::debug!(text = %extraction.extraction_text, "extraction not found in source");
        }
    }
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

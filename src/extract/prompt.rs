//! Few-shot prompt rendering.
//!
//! Examples are shown to the model in the same JSON shape it must answer
//! with: `{"extractions": [{"<class>": "<text>", "<class>_attributes": {..}}]}`.

use serde_json::{Map, Value};

use crate::data::{AttributeValue, ExampleData, Extraction};

/// Suffix marking the attribute object that belongs to a class key.
pub(crate) const ATTRIBUTE_SUFFIX: &str = "_attributes";

const ANSWER_RULES: &str = "Answer with a single JSON object of the form \
{\"extractions\": [...]}. Each item has one key naming the extraction class whose \
value is the exact text from the input, plus an optional \"<class>_attributes\" \
object. List items in order of appearance and copy text verbatim.";

/// Renders the full prompt for one chunk of input text.
pub(crate) fn render_prompt(description: &str, examples: &[ExampleData], chunk: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(description.trim());
    prompt.push_str("\n\n");
    prompt.push_str(ANSWER_RULES);
    prompt.push_str("\n\n");

    if !examples.is_empty() {
        prompt.push_str("Examples\n");
        for example in examples {
            prompt.push_str("Q: ");
            prompt.push_str(&example.text);
            prompt.push_str("\nA: ");
            prompt.push_str(&render_answer(&example.extractions));
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str("Q: ");
    prompt.push_str(chunk);
    prompt.push_str("\nA: ");
    prompt
}

/// Serializes extractions in the answer format.
pub(crate) fn render_answer(extractions: &[Extraction]) -> String {
    let items: Vec<Value> = extractions.iter().map(answer_item).collect();
    let mut root = Map::new();
    root.insert("extractions".to_string(), Value::Array(items));
    Value::Object(root).to_string()
}

fn answer_item(extraction: &Extraction) -> Value {
    let mut item = Map::new();
    item.insert(
        extraction.extraction_class.clone(),
        Value::String(extraction.extraction_text.clone()),
    );
    if let Some(attributes) = &extraction.attributes {
        let attrs: Map<String, Value> = attributes
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    AttributeValue::Text(s) => Value::String(s.clone()),
                    AttributeValue::List(items) => {
                        Value::Array(items.iter().cloned().map(Value::String).collect())
                    }
                };
                (name.clone(), value)
            })
            .collect();
        item.insert(
            format!("{}{}", extraction.extraction_class, ATTRIBUTE_SUFFIX),
            Value::Object(attrs),
        );
    }
    Value::Object(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_description_examples_and_question() {
        let examples = vec![ExampleData::new(
            "Patient was given 250 mg IV Cefazolin.",
            vec![
                Extraction::new("dosage", "250 mg"),
                Extraction::new("medication", "Cefazolin").with_attribute("kind", "antibiotic"),
            ],
        )];

        let prompt = render_prompt(
            "Extract medication information.\n",
            &examples,
            "Patient took 400 mg PO Ibuprofen.",
        );

        assert!(prompt.starts_with("Extract medication information.\n\n"));
        assert!(prompt.contains("Q: Patient was given 250 mg IV Cefazolin.\nA: {\"extractions\":"));
        assert!(prompt.contains(r#""medication_attributes":{"kind":"antibiotic"}"#));
        assert!(prompt.ends_with("Q: Patient took 400 mg PO Ibuprofen.\nA: "));
    }

    #[test]
    fn prompt_without_examples_skips_examples_header() {
        let prompt = render_prompt("Find names.", &[], "Ann met Bob.");
        assert!(!prompt.contains("Examples"));
    }

    #[test]
    fn answer_uses_class_keys() {
        let answer = render_answer(&[Extraction::new("route", "IV")]);
        assert_eq!(answer, r#"{"extractions":[{"route":"IV"}]}"#);
    }
}

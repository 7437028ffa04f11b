//! HTML rendering of annotated documents.
//!
//! Produces a self-contained fragment: a class legend, the source text with
//! aligned extractions highlighted, and a table of every extraction.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::data::{AnnotatedDocument, Extraction};

/// Highlight colors, assigned to classes in order of first appearance.
const PALETTE: [&str; 10] = [
    "#D2E3FC", "#C8E6C9", "#FEF0C3", "#F9DEDC", "#FFDDBE", "#EADDFF", "#C4E9E4", "#FCE4EC",
    "#E8EAED", "#DDE8E8",
];

const STYLE: &str = r#"<style>
.lx-doc { font-family: system-ui, sans-serif; max-width: 960px; margin: 1.5em auto; }
.lx-legend { margin-bottom: 0.75em; }
.lx-legend span { display: inline-block; padding: 2px 8px; margin: 0 6px 6px 0; border-radius: 4px; font-size: 0.9em; }
.lx-text { white-space: pre-wrap; line-height: 1.7; padding: 1em; border: 1px solid #ddd; border-radius: 6px; background: #fff; }
.lx-highlight { border-radius: 3px; padding: 1px 0; cursor: help; }
.lx-highlight:hover { outline: 2px solid #1a73e8; }
.lx-table { border-collapse: collapse; width: 100%; margin-top: 1em; font-size: 0.9em; }
.lx-table th, .lx-table td { border: 1px solid #ddd; padding: 4px 8px; text-align: left; vertical-align: top; }
.lx-table th { background: #f5f5f5; }
.lx-meta { color: #666; font-size: 0.85em; }
</style>"#;

/// Escapes text for safe inclusion in HTML element content and attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Maps each extraction class to a highlight color.
fn class_colors(extractions: &[Extraction]) -> BTreeMap<&str, &'static str> {
    let mut colors = BTreeMap::new();
    for extraction in extractions {
        let next = PALETTE[colors.len() % PALETTE.len()];
        colors
            .entry(extraction.extraction_class.as_str())
            .or_insert(next);
    }
    colors
}

fn describe_attributes(extraction: &Extraction) -> String {
    extraction
        .attributes
        .iter()
        .flatten()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Renders the text with non-overlapping highlights.
///
/// Extractions are visited by (start, end); one that overlaps an earlier
/// highlight is only listed in the table.
fn render_highlighted_text(
    document: &AnnotatedDocument,
    colors: &BTreeMap<&str, &'static str>,
) -> String {
    let chars: Vec<char> = document.text.chars().collect();
    let slice = |from: usize, to: usize| escape_html(&chars[from..to].iter().collect::<String>());

    let mut html = String::new();
    let mut cursor = 0;
    for extraction in document.aligned_extractions() {
        let Some(interval) = extraction.char_interval else {
            continue;
        };
        if interval.start_pos < cursor
            || interval.start_pos >= interval.end_pos
            || interval.end_pos > chars.len()
        {
            continue;
        }

        html.push_str(&slice(cursor, interval.start_pos));
        let mut title = extraction.extraction_class.clone();
        let attributes = describe_attributes(extraction);
        if !attributes.is_empty() {
            title.push_str(" | ");
            title.push_str(&attributes);
        }
        let color = colors
            .get(extraction.extraction_class.as_str())
            .copied()
            .unwrap_or(PALETTE[0]);
        let _ = write!(
            html,
            "<span class=\"lx-highlight\" style=\"background-color:{}\" title=\"{}\">{}</span>",
            color,
            escape_html(&title),
            slice(interval.start_pos, interval.end_pos)
        );
        cursor = interval.end_pos;
    }
    html.push_str(&slice(cursor, chars.len()));
    html
}

/// Renders one document as an HTML fragment (with its own stylesheet).
pub fn render_document(document: &AnnotatedDocument) -> String {
    let colors = class_colors(&document.extractions);
    let aligned = document.aligned_extractions().len();

    let mut html = String::new();
    html.push_str(STYLE);
    let _ = write!(
        html,
        "\n<div class=\"lx-doc\" data-document-id=\"{}\">\n",
        escape_html(&document.document_id)
    );
    let _ = writeln!(
        html,
        "<p class=\"lx-meta\">{} &middot; {} extractions, {} highlighted</p>",
        escape_html(&document.document_id),
        document.extractions.len(),
        aligned
    );

    html.push_str("<div class=\"lx-legend\">");
    for (class, color) in &colors {
        let _ = write!(
            html,
            "<span style=\"background-color:{}\">{}</span>",
            color,
            escape_html(class)
        );
    }
    html.push_str("</div>\n");

    let _ = writeln!(
        html,
        "<div class=\"lx-text\">{}</div>",
        render_highlighted_text(document, &colors)
    );

    html.push_str(
        "<table class=\"lx-table\">\n<thead><tr><th>#</th><th>Class</th><th>Text</th>\
         <th>Position</th><th>Attributes</th></tr></thead>\n<tbody>\n",
    );
    for (idx, extraction) in document.extractions.iter().enumerate() {
        let position = extraction
            .char_interval
            .map(|i| format!("{}-{}", i.start_pos, i.end_pos))
            .unwrap_or_else(|| "unaligned".to_string());
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            idx + 1,
            escape_html(&extraction.extraction_class),
            escape_html(&extraction.extraction_text),
            position,
            escape_html(&describe_attributes(extraction))
        );
    }
    html.push_str("</tbody>\n</table>\n</div>");
    html
}

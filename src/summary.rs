//! Console summaries printed after a dataset run.
//!
//! Each dataset names its summary in JSON (`summary_type`); the name is
//! resolved to a [`SummaryKind`] when the registry loads, so an unknown name
//! fails before anything runs.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::data::{AnnotatedDocument, Extraction};

/// Attribute used by the relationship summary to group extractions.
pub const GROUP_ATTRIBUTE: &str = "medication_group";

/// The closed set of console summaries a dataset can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    /// Every extraction in result order.
    Basic,
    /// Extractions grouped by their `medication_group` attribute.
    Relationship,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Basic => "basic",
            SummaryKind::Relationship => "relationship",
        }
    }

    /// Writes the summary for `result` to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error only if writing to `out` fails.
    pub fn render<W: Write + ?Sized>(
        &self,
        result: &AnnotatedDocument,
        input_text: &str,
        out: &mut W,
    ) -> io::Result<()> {
        match self {
            SummaryKind::Basic => basic_summary(result, input_text, out),
            SummaryKind::Relationship => relationship_summary(result, input_text, out),
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a summary name is not one of the known kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSummaryKind(pub String);

impl fmt::Display for UnknownSummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown summary type '{}'", self.0)
    }
}

impl std::error::Error for UnknownSummaryKind {}

impl FromStr for SummaryKind {
    type Err = UnknownSummaryKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(SummaryKind::Basic),
            "relationship" => Ok(SummaryKind::Relationship),
            other => Err(UnknownSummaryKind(other.to_string())),
        }
    }
}

fn basic_summary<W: Write + ?Sized>(
    result: &AnnotatedDocument,
    input_text: &str,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "Input: {}\n", input_text.trim())?;
    writeln!(out, "Extracted entities:")?;
    for extraction in &result.extractions {
        writeln!(out, "• {}", format_entity(extraction))?;
    }
    Ok(())
}

fn relationship_summary<W: Write + ?Sized>(
    result: &AnnotatedDocument,
    input_text: &str,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "Input text: {}\n", input_text.trim())?;
    writeln!(out, "Extracted medications:")?;

    // Groups keep first-appearance order.
    let mut groups: Vec<(&str, Vec<&Extraction>)> = Vec::new();
    for extraction in &result.extractions {
        let Some(group_name) = extraction.attribute_text(GROUP_ATTRIBUTE) else {
            writeln!(
                out,
                "  ⚠ Missing {} for {}",
                GROUP_ATTRIBUTE, extraction.extraction_text
            )?;
            continue;
        };

        match groups.iter().position(|(name, _)| *name == group_name) {
            Some(idx) => groups[idx].1.push(extraction),
            None => groups.push((group_name, vec![extraction])),
        }
    }

    for (group_name, members) in groups {
        writeln!(out, "\n* {}", group_name)?;
        for extraction in members {
            writeln!(out, "  • {}", format_entity(extraction))?;
        }
    }
    Ok(())
}

fn format_entity(extraction: &Extraction) -> String {
    format!(
        "{}: {}{}",
        capitalize(&extraction.extraction_class),
        extraction.extraction_text,
        format_position(extraction)
    )
}

fn format_position(extraction: &Extraction) -> String {
    match extraction.char_interval {
        Some(interval) => format!(" (pos: {}-{})", interval.start_pos, interval.end_pos),
        None => String::new(),
    }
}

/// Uppercases the first character and lowercases the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

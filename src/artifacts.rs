//! Run artifacts: `{prefix}.jsonl` plus `{prefix}.html`.
//!
//! The prefix encodes dataset, model and pass count. It is the only record of
//! a run's metadata; the outputs index recovers it by parsing file names.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::data::AnnotatedDocument;
use crate::visualize::render_document;

/// Separator between the prefix fields.
pub const PREFIX_DELIMITER: &str = "__";

/// Metadata recovered from an artifact prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub dataset: String,
    /// Model id with `/` and `:` already replaced by `_`.
    pub model: String,
    pub passes: usize,
}

/// Paths written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub jsonl: PathBuf,
    pub html: PathBuf,
}

/// Derives the file name prefix for a run.
///
/// # Examples
///
/// ```
/// use lxs::artifacts::artifact_prefix;
///
/// assert_eq!(artifact_prefix("x", "a/b:c", 2), "x__a_b_c__pass2");
/// ```
pub fn artifact_prefix(dataset: &str, model_id: &str, passes: usize) -> String {
    format!(
        "{dataset}{d}{model}{d}pass{passes}",
        d = PREFIX_DELIMITER,
        model = sanitize_model_id(model_id),
    )
}

/// Replaces path separators and colons so the model id is file-name safe.
pub fn sanitize_model_id(model_id: &str) -> String {
    model_id.replace(['/', '\\', ':'], "_")
}

/// Parses a prefix produced by [`artifact_prefix`].
///
/// The first segment is the dataset and the last must be `pass{n}`; anything
/// between is the model, so model ids containing the delimiter survive.
/// Returns `None` for stems without that shape.
pub fn parse_artifact_prefix(stem: &str) -> Option<ArtifactMeta> {
    let (dataset, rest) = stem.split_once(PREFIX_DELIMITER)?;
    let (model, pass_segment) = rest.rsplit_once(PREFIX_DELIMITER)?;
    let digits = pass_segment.strip_prefix("pass")?;
    if dataset.is_empty() || model.is_empty() || digits.is_empty() {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(ArtifactMeta {
        dataset: dataset.to_string(),
        model: model.to_string(),
        passes: digits.parse().ok()?,
    })
}

/// Writes documents as JSONL, one per line, creating parent directories.
pub fn save_annotated_documents(documents: &[AnnotatedDocument], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for document in documents {
        serde_json::to_writer(&mut writer, document)
            .with_context(|| format!("Failed to serialize document {}", document.document_id))?;
        writer.write_all(b"\n")?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Reads every document of a JSONL file. Blank lines are ignored.
pub fn load_annotated_documents(path: &Path) -> Result<Vec<AnnotatedDocument>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut documents = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| {
            format!("Failed to read line {} of {}", line_num + 1, path.display())
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str(&line).with_context(|| {
            format!("Failed to parse line {} of {}", line_num + 1, path.display())
        })?;
        documents.push(document);
    }
    Ok(documents)
}

/// Writes `{prefix}.jsonl` and `{prefix}.html` for `document` into
/// `output_dir`, creating it if needed and overwriting existing files.
///
/// The HTML is rendered from the JSONL just written, so both files always
/// describe the same data.
pub fn save_artifacts(
    document: &AnnotatedDocument,
    output_dir: &Path,
    prefix: &str,
) -> Result<ArtifactPaths> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let jsonl = output_dir.join(format!("{}.jsonl", prefix));
    save_annotated_documents(std::slice::from_ref(document), &jsonl)?;

    let documents = load_annotated_documents(&jsonl)?;
    let html = output_dir.join(format!("{}.html", prefix));
    let page = documents
        .iter()
        .map(render_document)
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(&html, wrap_page(prefix, &page))
        .with_context(|| format!("Failed to write {}", html.display()))?;

    tracing::info!(jsonl = %jsonl.display(), html = %html.display(), "wrote artifacts");
    Ok(ArtifactPaths { jsonl, html })
}

fn wrap_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        crate::visualize::escape_html(title),
        body
    )
}

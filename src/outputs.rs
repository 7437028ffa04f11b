//! Static outputs site rebuilt over an artifact directory.
//!
//! Every `*.jsonl` file in the directory is one run. The site is three pages,
//! regenerated in full each time:
//!
//! - `index.html` lists runs with links to their files and the viewers
//! - `jsonl_viewer.html` renders one run's documents and extractions
//! - `comparison.html` shows every run of a dataset side by side
//!
//! Both viewers carry the run data inline (base64), so they also work when
//! opened straight from disk.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use serde_json::Value;
use reqwest::Url;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::artifacts::parse_artifact_prefix;
use crate::visualize::escape_html;

pub const INDEX_PAGE: &str = "index.html";
pub const VIEWER_PAGE: &str = "jsonl_viewer.html";
pub const COMPARISON_PAGE: &str = "comparison.html";

/// Placeholder origin for building relative viewer links.
const VIEWER_BASE: &str = "http://localhost/";

/// Model shown for runs whose file name does not carry run metadata.
pub const UNKNOWN_MODEL: &str = "unknown";

/// One JSONL artifact found in the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEntry {
    pub dataset: String,
    pub model: String,
    /// `None` when the file name could not be parsed.
    pub passes: Option<usize>,
    /// JSONL file name, relative to the output directory.
    pub jsonl: String,
    /// Sibling HTML report, if one exists.
    pub html: Option<String>,
    pub documents: usize,
    pub extractions: usize,
    /// Base64 of the JSONL file contents.
    pub data: String,
}

impl RunEntry {
    fn passes_label(&self) -> String {
        self.passes
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

/// All runs in an output directory, sorted by (dataset, model, passes).
#[derive(Debug, Clone, Default)]
pub struct OutputsIndex {
    runs: Vec<RunEntry>,
}

impl OutputsIndex {
    pub fn runs(&self) -> &[RunEntry] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Runs grouped by dataset, for the comparison page.
    pub fn manifest(&self) -> BTreeMap<String, Vec<RunEntry>> {
        let mut grouped: BTreeMap<String, Vec<RunEntry>> = BTreeMap::new();
        for run in &self.runs {
            grouped
                .entry(run.dataset.clone())
                .or_default()
                .push(run.clone());
        }
        grouped
    }
}

/// Counts documents and extractions in JSONL content.
///
/// Lines that are not JSON objects are skipped with a warning.
fn count_records(content: &str, file_name: &str) -> (usize, usize) {
    let mut documents = 0;
    let mut extractions = 0;
    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => {
                documents += 1;
                extractions += record
                    .get("extractions")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
            }
            Ok(_) => {
                tracing::warn!(
                    file = file_name,
                    line = line_num + 1,
                    "skipping non-object JSONL line"
                );
            }
            Err(e) => {
                tracing::warn!(
                    file = file_name,
                    line = line_num + 1,
                    error = %e,
                    "skipping malformed JSONL line"
                );
            }
        }
    }
    (documents, extractions)
}

/// Scans `dir` for run artifacts. A missing directory yields an empty index.
pub fn scan_outputs(dir: &Path) -> Result<OutputsIndex> {
    if !dir.exists() {
        return Ok(OutputsIndex::default());
    }

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read output directory: {}", dir.display()))?;

    let mut runs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let (Some(stem), Some(file_name)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.file_name().and_then(|s| s.to_str()),
        ) else {
            tracing::warn!(path = %path.display(), "skipping artifact with non UTF-8 name");
            continue;
        };

        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);
        if let Cow::Owned(_) = content {
            tracing::warn!(file = file_name, "artifact is not valid UTF-8; counting what decodes");
        }
        let (documents, extractions) = count_records(&content, file_name);

        let html_name = format!("{}.html", stem);
        let html = dir.join(&html_name).is_file().then_some(html_name);

        let (dataset, model, passes) = match parse_artifact_prefix(stem) {
            Some(meta) => (meta.dataset, meta.model, Some(meta.passes)),
            None => (stem.to_string(), UNKNOWN_MODEL.to_string(), None),
        };

        runs.push(RunEntry {
            dataset,
            model,
            passes,
            jsonl: file_name.to_string(),
            html,
            documents,
            extractions,
            data: STANDARD.encode(&bytes),
        });
    }

    runs.sort_by(|a, b| {
        (&a.dataset, &a.model, a.passes, &a.jsonl).cmp(&(&b.dataset, &b.model, b.passes, &b.jsonl))
    });
    Ok(OutputsIndex { runs })
}

/// Rebuilds `index.html`, `jsonl_viewer.html` and `comparison.html` in `dir`.
pub fn write_site(dir: &Path) -> Result<OutputsIndex> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let index = scan_outputs(dir)?;
    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("Failed to format generation timestamp")?;

    let pages = [
        (INDEX_PAGE, render_index(&index, &generated_at)?),
        (VIEWER_PAGE, render_viewer(&index)?),
        (COMPARISON_PAGE, render_comparison(&index)?),
    ];
    for (name, html) in pages {
        let path = dir.join(name);
        fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    tracing::info!(dir = %dir.display(), runs = index.runs.len(), "rebuilt outputs site");
    Ok(index)
}

/// Serializes `value` for a `<script>` block.
///
/// Every `<` becomes `\u003c`, so neither `</script>` nor `<!--` can appear
/// in the data. `<` only occurs inside JSON strings, where the escape decodes
/// to the same character.
fn embed_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).context("Failed to serialize manifest")?;
    Ok(json.replace('<', "\\u003c"))
}

/// Viewer link for one run, with the file name as a form-encoded query value.
fn viewer_link(jsonl: &str) -> Result<String> {
    let mut url = Url::parse(VIEWER_BASE).context("Failed to build viewer link")?;
    url.query_pairs_mut().append_pair("file", jsonl);
    Ok(format!("{}?{}", VIEWER_PAGE, url.query().unwrap_or_default()))
}

const INDEX_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Extraction outputs</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 1100px; margin: 2em auto; padding: 0 1em; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 6px 10px; text-align: left; }
th { background: #f5f5f5; }
td.num { text-align: right; }
.empty { color: #666; font-style: italic; }
footer { margin-top: 2em; color: #888; font-size: 0.85em; }
</style>
</head>
<body>
<h1>Extraction outputs</h1>
<p><a href="jsonl_viewer.html">JSONL viewer</a> &middot; <a href="comparison.html">Comparison viewer</a></p>
{{CONTENT}}
<footer>Generated {{GENERATED_AT}}</footer>
</body>
</html>
"##;

fn render_index(index: &OutputsIndex, generated_at: &str) -> Result<String> {
    let content = if index.is_empty() {
        "<p class=\"empty\">No artifacts found.</p>".to_string()
    } else {
        let mut table = String::from(
            "<table>\n<thead><tr><th>Dataset</th><th>Model</th><th>Passes</th>\
             <th>Documents</th><th>Extractions</th><th>Files</th></tr></thead>\n<tbody>\n",
        );
        for run in &index.runs {
            let jsonl = escape_html(&run.jsonl);
            let mut links = format!("<a href=\"{0}\">JSONL</a>", jsonl);
            if let Some(html) = &run.html {
                let _ = write!(links, " &middot; <a href=\"{}\">HTML</a>", escape_html(html));
            }
            let _ = write!(
                links,
                " &middot; <a href=\"{}\">Viewer</a>",
                escape_html(&viewer_link(&run.jsonl)?)
            );
            let _ = writeln!(
                table,
                "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
                 <td class=\"num\">{}</td><td>{}</td></tr>",
                escape_html(&run.dataset),
                escape_html(&run.model),
                run.passes_label(),
                run.documents,
                run.extractions,
                links
            );
        }
        table.push_str("</tbody>\n</table>");
        table
    };

    Ok(INDEX_TEMPLATE
        .replace("{{GENERATED_AT}}", &escape_html(generated_at))
        .replace("{{CONTENT}}", &content))
}

const VIEWER_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>JSONL viewer</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 1100px; margin: 2em auto; padding: 0 1em; }
table { border-collapse: collapse; width: 100%; margin-top: 1em; }
th, td { border: 1px solid #ddd; padding: 4px 8px; text-align: left; vertical-align: top; }
th { background: #f5f5f5; }
pre { background: #f8f8f8; padding: 1em; overflow-x: auto; white-space: pre-wrap; }
.error { color: #b00020; }
</style>
</head>
<body>
<h1>JSONL viewer</h1>
<p><a href="index.html">Back to index</a></p>
<label>Run: <select id="run-select"></select></label>
<div id="status"></div>
<h2>Extractions</h2>
<div id="extractions"></div>
<h2>Raw entries</h2>
<div id="raw"></div>
<script>
const RUNS = {{MANIFEST}};

function esc(value) {
  return String(value).replace(/[&<>"']/g, c => ({"&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;", "'": "&#39;"}[c]));
}

function decodeBase64(data) {
  const bytes = Uint8Array.from(atob(data), c => c.charCodeAt(0));
  return new TextDecoder().decode(bytes);
}

function loadRun(run) {
  if (run.data) {
    return Promise.resolve(decodeBase64(run.data));
  }
  return fetch(run.jsonl).then(r => {
    if (!r.ok) throw new Error("HTTP " + r.status);
    return r.text();
  });
}

function parseLines(text) {
  const records = [];
  for (const line of text.split("\n")) {
    if (!line.trim()) continue;
    try { records.push(JSON.parse(line)); } catch (e) { /* skip malformed line */ }
  }
  return records;
}

function render(records) {
  const rows = [];
  for (const doc of records) {
    for (const ex of (doc.extractions || [])) {
      const pos = ex.char_interval ? ex.char_interval.start_pos + "-" + ex.char_interval.end_pos : "";
      const attrs = ex.attributes ? JSON.stringify(ex.attributes) : "";
      rows.push("<tr><td>" + esc(doc.document_id || "") + "</td><td>" + esc(ex.extraction_class) +
        "</td><td>" + esc(ex.extraction_text) + "</td><td>" + esc(pos) + "</td><td>" +
        esc(ex.alignment_status || "") + "</td><td>" + esc(attrs) + "</td></tr>");
    }
  }
  document.getElementById("extractions").innerHTML = rows.length
    ? "<table><thead><tr><th>Document</th><th>Class</th><th>Text</th><th>Position</th><th>Alignment</th><th>Attributes</th></tr></thead><tbody>" + rows.join("") + "</tbody></table>"
    : "<p>No extractions.</p>";
  document.getElementById("raw").innerHTML = records
    .map(r => "<pre>" + esc(JSON.stringify(r, null, 2)) + "</pre>")
    .join("");
}

function show(file) {
  const run = RUNS.find(r => r.jsonl === file) || { jsonl: file };
  const status = document.getElementById("status");
  status.textContent = "Loading " + file + "...";
  loadRun(run)
    .then(text => {
      const records = parseLines(text);
      status.textContent = records.length + " document(s) in " + file;
      render(records);
    })
    .catch(err => {
      status.innerHTML = '<span class="error">Failed to load ' + esc(file) + ": " + esc(err.message) + "</span>";
    });
}

const select = document.getElementById("run-select");
for (const run of RUNS) {
  const option = document.createElement("option");
  option.value = run.jsonl;
  option.textContent = run.dataset + " / " + run.model + " / pass " + (run.passes === null ? "?" : run.passes);
  select.appendChild(option);
}
select.addEventListener("change", () => show(select.value));

const requested = new URLSearchParams(window.location.search).get("file");
if (requested) {
  select.value = requested;
  show(requested);
} else if (RUNS.length) {
  show(RUNS[0].jsonl);
} else {
  document.getElementById("status").textContent = "No artifacts found.";
}
</script>
</body>
</html>
"##;

fn render_viewer(index: &OutputsIndex) -> Result<String> {
    Ok(VIEWER_TEMPLATE.replace("{{MANIFEST}}", &embed_json(&index.runs)?))
}

const COMPARISON_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Comparison viewer</title>
<style>
body { font-family: system-ui, sans-serif; margin: 2em; }
#columns { display: grid; grid-template-columns: repeat(auto-fit, minmax(280px, 1fr)); gap: 1em; margin-top: 1em; }
.column { border: 1px solid #ddd; border-radius: 6px; padding: 0.75em; }
.column h3 { margin-top: 0; font-size: 1em; }
.column ul { padding-left: 1.2em; }
.meta { color: #666; font-size: 0.85em; }
</style>
</head>
<body>
<h1>Comparison viewer</h1>
<p><a href="index.html">Back to index</a></p>
<label>Dataset: <select id="dataset-select"></select></label>
<div id="columns"></div>
<script>
const MANIFEST = {{MANIFEST}};

function esc(value) {
  return String(value).replace(/[&<>"']/g, c => ({"&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;", "'": "&#39;"}[c]));
}

function decodeBase64(data) {
  const bytes = Uint8Array.from(atob(data), c => c.charCodeAt(0));
  return new TextDecoder().decode(bytes);
}

function loadRun(run) {
  if (run.data) return Promise.resolve(decodeBase64(run.data));
  return fetch(run.jsonl).then(r => r.text());
}

function renderColumn(run, text) {
  const items = [];
  for (const line of text.split("\n")) {
    if (!line.trim()) continue;
    let doc;
    try { doc = JSON.parse(line); } catch (e) { continue; }
    for (const ex of (doc.extractions || [])) {
      const attrs = ex.attributes
        ? " <span class=\"meta\">" + esc(Object.entries(ex.attributes).map(([k, v]) => k + ": " + v).join("; ")) + "</span>"
        : "";
      items.push("<li><strong>" + esc(ex.extraction_class) + "</strong>: " + esc(ex.extraction_text) + attrs + "</li>");
    }
  }
  const passes = run.passes === null ? "?" : run.passes;
  return '<div class="column"><h3>' + esc(run.model) + " &middot; pass " + esc(passes) + "</h3>" +
    '<p class="meta">' + run.documents + " document(s), " + run.extractions + " extraction(s)</p>" +
    "<ul>" + items.join("") + "</ul></div>";
}

function showDataset(name) {
  const runs = MANIFEST[name] || [];
  Promise.all(runs.map(run => loadRun(run).then(text => renderColumn(run, text)).catch(() => "")))
    .then(columns => { document.getElementById("columns").innerHTML = columns.join(""); });
}

const select = document.getElementById("dataset-select");
const names = Object.keys(MANIFEST);
for (const name of names) {
  const option = document.createElement("option");
  option.value = name;
  option.textContent = name + " (" + MANIFEST[name].length + " run(s))";
  select.appendChild(option);
}
select.addEventListener("change", () => showDataset(select.value));
if (names.length) {
  showDataset(names[0]);
} else {
  document.getElementById("columns").textContent = "No artifacts found.";
}
</script>
</body>
</html>
"##;

fn render_comparison(index: &OutputsIndex) -> Result<String> {
    Ok(COMPARISON_TEMPLATE.replace("{{MANIFEST}}", &embed_json(&index.manifest())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOC_LINE: &str = r#"{"extractions":[{"extraction_class":"character","extraction_text":"ROMEO"}],"text":"ROMEO.","document_id":"doc_00000001"}"#;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn three_line_jsonl_becomes_one_run() {
        let temp = TempDir::new().unwrap();
        let content = format!("{0}\n{0}\n{0}\n", DOC_LINE);
        write(temp.path(), "romeo__gemini-2.5-flash__pass2.jsonl", &content);
        write(temp.path(), "romeo__gemini-2.5-flash__pass2.html", "<html></html>");

        let index = scan_outputs(temp.path()).unwrap();

        assert_eq!(index.runs().len(), 1);
        let run = &index.runs()[0];
        assert_eq!(run.dataset, "romeo");
        assert_eq!(run.model, "gemini-2.5-flash");
        assert_eq!(run.passes, Some(2));
        assert_eq!(run.documents, 3);
        assert_eq!(run.extractions, 3);
        assert_eq!(run.html.as_deref(), Some("romeo__gemini-2.5-flash__pass2.html"));
        assert_eq!(STANDARD.decode(&run.data).unwrap(), content.as_bytes());

        let manifest = index.manifest();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest["romeo"].len(), 1);
    }

    #[test]
    fn empty_directory_renders_placeholder() {
        let temp = TempDir::new().unwrap();

        let index = write_site(temp.path()).unwrap();

        assert!(index.is_empty());
        let page = fs::read_to_string(temp.path().join(INDEX_PAGE)).unwrap();
        assert!(page.contains("No artifacts found"));
        let comparison = fs::read_to_string(temp.path().join(COMPARISON_PAGE)).unwrap();
        assert!(comparison.contains("const MANIFEST = {};"));
        let viewer = fs::read_to_string(temp.path().join(VIEWER_PAGE)).unwrap();
        assert!(viewer.contains("const RUNS = [];"));
    }

    #[test]
    fn unparseable_stems_are_listed_as_unknown() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "romeo_juliet_basic.jsonl", DOC_LINE);

        let index = scan_outputs(temp.path()).unwrap();

        let run = &index.runs()[0];
        assert_eq!(run.dataset, "romeo_juliet_basic");
        assert_eq!(run.model, UNKNOWN_MODEL);
        assert_eq!(run.passes, None);
        assert_eq!(run.html, None);
        assert_eq!(run.passes_label(), "?");
    }

    #[test]
    fn malformed_lines_are_skipped_when_counting() {
        let (documents, extractions) =
            count_records(&format!("{}\nnot json\n\n[1,2]\n", DOC_LINE), "x.jsonl");

        assert_eq!(documents, 1);
        assert_eq!(extractions, 1);
    }

    #[test]
    fn runs_are_sorted_and_other_files_ignored() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b__m__pass1.jsonl", DOC_LINE);
        write(temp.path(), "a__m__pass2.jsonl", DOC_LINE);
        write(temp.path(), "a__m__pass1.jsonl", DOC_LINE);
        write(temp.path(), "notes.txt", "ignored");
        fs::create_dir(temp.path().join("nested.jsonl")).unwrap();

        let index = scan_outputs(temp.path()).unwrap();

        let names: Vec<&str> = index.runs().iter().map(|r| r.jsonl.as_str()).collect();
        assert_eq!(
            names,
            vec!["a__m__pass1.jsonl", "a__m__pass2.jsonl", "b__m__pass1.jsonl"]
        );
    }

    #[test]
    fn embedded_json_cannot_close_script() {
        let payload = "</script><script>alert(1)</script>";
        let embedded = embed_json(&vec![payload]).unwrap();

        assert!(!embedded.contains('<'));
        assert!(embedded.contains("\\u003c/script>"));
        let decoded: Vec<String> = serde_json::from_str(&embedded).unwrap();
        assert_eq!(decoded, vec![payload]);
    }

    #[test]
    fn embedded_json_cannot_open_a_comment() {
        let embedded = embed_json(&vec!["<!-- <script>"]).unwrap();

        assert!(!embedded.contains("<!--"));
        assert!(!embedded.contains("<script"));
        let decoded: Vec<String> = serde_json::from_str(&embedded).unwrap();
        assert_eq!(decoded, vec!["<!-- <script>"]);
    }

    #[test]
    fn invalid_utf8_artifact_does_not_abort_the_site() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a__m__pass1.jsonl", DOC_LINE);
        fs::write(temp.path().join("b__m__pass1.jsonl"), b"\xff\xfe\n").unwrap();

        let index = write_site(temp.path()).unwrap();

        assert_eq!(index.runs().len(), 2);
        let broken = &index.runs()[1];
        assert_eq!(broken.jsonl, "b__m__pass1.jsonl");
        assert_eq!(broken.documents, 0);
        assert_eq!(STANDARD.decode(&broken.data).unwrap(), b"\xff\xfe\n");
        assert_eq!(index.runs()[0].documents, 1);
        assert!(temp.path().join(INDEX_PAGE).is_file());
    }

    #[test]
    fn index_links_files_and_viewer() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "x__a_b__pass1.jsonl", DOC_LINE);
        write(temp.path(), "x__a_b__pass1.html", "<html></html>");

        write_site(temp.path()).unwrap();

        let page = fs::read_to_string(temp.path().join(INDEX_PAGE)).unwrap();
        assert!(page.contains("<a href=\"x__a_b__pass1.jsonl\">JSONL</a>"));
        assert!(page.contains("<a href=\"x__a_b__pass1.html\">HTML</a>"));
        assert!(page.contains("jsonl_viewer.html?file=x__a_b__pass1.jsonl"));
        assert!(page.contains("Generated "));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn viewer_links_encode_the_file_name() {
        assert_eq!(
            viewer_link("a b&c=d.jsonl").unwrap(),
            "jsonl_viewer.html?file=a+b%26c%3Dd.jsonl"
        );
        assert_eq!(
            viewer_link("x__a_b__pass1.jsonl").unwrap(),
            "jsonl_viewer.html?file=x__a_b__pass1.jsonl"
        );
    }

    #[test]
    fn missing_directory_scans_as_empty() {
        let temp = TempDir::new().unwrap();
        let index = scan_outputs(&temp.path().join("absent")).unwrap();
        assert!(index.is_empty());
    }
}

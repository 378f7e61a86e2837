//! Brace-to-label block rewriting
//!
//! Converts every brace-delimited block in the `*.tmdl` files under a root
//! directory into label style:
//!
//! ```text
//! column Sales = {              column Sales:
//!     dataType: double    =>      dataType: double
//! }
//! ```
//!
//! Label-style blocks and everything outside a recognized block are copied
//! through unchanged. A file without brace blocks is never rewritten, which
//! makes the pass idempotent.

use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span, warn};

use crate::error::TmdlResult;
use crate::report::PassReport;
use crate::storage::{discover_files, is_json_like, read_text, write_atomic};
use crate::tmdl::{Document, Node, parse_nodes, render_nodes};

pub const PASS_NAME: &str = "normalize";

/// Result of normalizing one file's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    /// Brace blocks converted; zero means `text` equals the input
    pub conversions: usize,
}

/// Normalize the text of a single file; `path` is only used in errors
pub fn normalize_text(text: &str, path: &Path) -> TmdlResult<Normalized> {
    let doc = Document::parse(text);
    let unit = doc.indent_unit();
    let nodes = parse_nodes(&doc.lines, 1, unit, path)?;
    let conversions: usize = nodes.iter().map(Node::block_count).sum();

    if conversions == 0 {
        return Ok(Normalized {
            text: text.to_string(),
            conversions,
        });
    }

    let rendered = doc.with_lines(render_nodes(&nodes, unit)).render();
    Ok(Normalized {
        text: rendered,
        conversions,
    })
}

/// Outcome of normalizing one file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Converted(usize),
    Unchanged,
    SkippedJson,
}

/// Normalize one file in place; the file is only written when a block changed
pub fn normalize_file(path: &Path) -> TmdlResult<FileOutcome> {
    let original = read_text(path)?;
    if is_json_like(&original) {
        warn!(path = %path.display(), "Skipping JSON-like file");
        return Ok(FileOutcome::SkippedJson);
    }

    let normalized = normalize_text(&original, path)?;
    if normalized.conversions == 0 {
        debug!(path = %path.display(), "No brace blocks");
        return Ok(FileOutcome::Unchanged);
    }

    write_atomic(path, &normalized.text)?;
    debug!(
        path = %path.display(),
        conversions = normalized.conversions,
        "Converted brace blocks"
    );
    Ok(FileOutcome::Converted(normalized.conversions))
}

/// The normalization pass over a directory tree
#[derive(Debug, Clone)]
pub struct Normalizer {
    root: PathBuf,
}

impl Normalizer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize every `*.tmdl` file under the root, stopping at the first error
    pub fn run(&self) -> TmdlResult<PassReport> {
        let _span = info_span!("normalize", root = %self.root.display()).entered();

        let files = discover_files(&self.root, "*.tmdl", true)?;
        let mut report = PassReport::new(PASS_NAME);

        for file in &files {
            match normalize_file(file)? {
                FileOutcome::Converted(count) => report.record(file, count),
                FileOutcome::Unchanged => report.record(file, 0),
                FileOutcome::SkippedJson => report.skip(file),
            }
        }

        info!(
            files = report.files_scanned,
            changed = report.files_changed.len(),
            conversions = report.changes,
            "TMDL files normalized"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TmdlError;
    use tempfile::TempDir;

    const BRACE_TABLE: &str = "\
table Orders {

    column Order_ID = {
        dataType: string
        sourceColumn: Order_ID // natural key
    }

    column Sales = { dataType: double }

    partition Orders = {
        mode: import
        source =
            let
                Source = Csv.Document(File.Contents(\"orders.csv\")),
                Typed = Table.TransformColumnTypes(Source, {{\"Sales\", type number}})
            in
                Typed
    }
}
";

    #[test]
    fn test_round_trip_block_conversion() {
        let out = normalize_text("column X = { type: string }\n", Path::new("X.tmdl")).unwrap();
        assert_eq!(out.text, "column X:\n  type: string\n");
        assert_eq!(out.conversions, 1);

        let again = normalize_text(&out.text, Path::new("X.tmdl")).unwrap();
        assert_eq!(again.conversions, 0);
        assert_eq!(again.text, out.text);
    }

    #[test]
    fn test_full_table_conversion() {
        let out = normalize_text(BRACE_TABLE, Path::new("Orders.tmdl")).unwrap();
        let expected = "\
table Orders

  column Order_ID:
    dataType: string
    sourceColumn: Order_ID // natural key

  column Sales:
    dataType: double

  partition Orders:
    mode: import
    source =
        let
            Source = Csv.Document(File.Contents(\"orders.csv\")),
            Typed = Table.TransformColumnTypes(Source, {{\"Sales\", type number}})
        in
            Typed
";
        assert_eq!(out.text, expected);
        assert_eq!(out.conversions, 4);
    }

    #[test]
    fn test_idempotent_on_disk() {
        let temp = TempDir::new().unwrap();
        let tables = temp.path().join("tables");
        std::fs::create_dir_all(&tables).unwrap();
        let path = tables.join("Orders.tmdl");
        std::fs::write(&path, BRACE_TABLE).unwrap();

        let first = Normalizer::new(temp.path()).run().unwrap();
        assert_eq!(first.files_changed, vec![path.clone()]);
        let once = std::fs::read_to_string(&path).unwrap();

        let second = Normalizer::new(temp.path()).run().unwrap();
        assert!(second.is_noop());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), once);
    }

    #[test]
    fn test_malformed_block_leaves_file_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Broken.tmdl");
        let text = "table Broken\n\n  column A = {\n    dataType: string\n";
        std::fs::write(&path, text).unwrap();

        let err = Normalizer::new(temp.path()).run().unwrap_err();
        assert!(matches!(err, TmdlError::MalformedBlock { line: 3, .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_json_files_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("database.tmdl");
        std::fs::write(&path, "{ \"compatibilityLevel\": 1567 }").unwrap();

        let report = Normalizer::new(temp.path()).run().unwrap();
        assert_eq!(report.files_skipped, vec![path]);
        assert!(report.is_noop());
    }
}

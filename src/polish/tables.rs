//! Table file polishing
//!
//! Runs over `<definition>/tables/*.tmdl` after normalization and applies
//! independent fix-ups:
//! - partition `source =` expressions get balanced braces, repairing an
//!   off-by-one at the end of the expression
//! - `columns:` / `partitions:` grouping labels are removed and their
//!   children dedented to the label's level
//! - every table carries exactly one table-level
//!   `annotation PBI_ResultType = Table`
//!
//! Two more rewrites are opt-in through [`TablePolishOptions`].

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::error::{TmdlError, TmdlResult};
use crate::report::PassReport;
use crate::storage::{discover_files, is_json_like, read_text, write_atomic};
use crate::tmdl::expression::{BraceCount, comment_start, trailing_close_brace};
use crate::tmdl::{Document, indent_width, is_blank, leading_ws, strip_indent};

pub const PASS_NAME: &str = "polish-tables";

/// Directory under the definition folder holding one file per table
pub const TABLES_DIR: &str = "tables";

static GROUP_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(columns|partitions)\s*:\s*(//.*)?$").unwrap());

static PARTITION_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*partition\b").unwrap());

static SOURCE_PROPERTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*source\s*=").unwrap());

static TABLE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*table\s+\S").unwrap());

static RESULT_TYPE_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*annotation\s+PBI_ResultType\s*=").unwrap());

/// Opt-in rewrites on top of the default fix-ups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablePolishOptions {
    /// Re-indent to two spaces per nesting level: column and partition
    /// headers at 2, properties at 4, `let`/`in` at 6, steps at 8
    pub reindent: bool,
    /// Turn `{{` / `}}` inside partition expressions into single braces
    /// before counting
    pub collapse_doubled_braces: bool,
}

/// Result of polishing one file's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polished {
    pub text: String,
    pub changes: usize,
}

/// Polish the text of one table file; `path` is only used in errors
pub fn polish_table_text(
    text: &str,
    path: &Path,
    options: TablePolishOptions,
) -> TmdlResult<Polished> {
    let doc = Document::parse(text);
    let mut lines = doc.lines.clone();

    // brace repair first so reported line numbers match the file on disk
    let mut changes = repair_partition_sources(&mut lines, path, options.collapse_doubled_braces)?;
    changes += drop_group_labels(&mut lines);
    changes += ensure_result_type_annotation(&mut lines, doc.indent_unit());
    if options.reindent && reindent(&mut lines) {
        changes += 1;
    }

    if lines == doc.lines {
        return Ok(Polished {
            text: text.to_string(),
            changes: 0,
        });
    }
    Ok(Polished {
        text: doc.with_lines(lines).render(),
        changes: changes.max(1),
    })
}

/// Index past the last line of the block that starts after `start`, where a
/// block is every following line that is blank or indented deeper than
/// `width`; trailing blank lines are not part of it
fn block_end(lines: &[String], start: usize, width: usize) -> usize {
    let mut end = start;
    while end < lines.len() && (is_blank(&lines[end]) || indent_width(&lines[end]) > width) {
        end += 1;
    }
    while end > start && is_blank(&lines[end - 1]) {
        end -= 1;
    }
    end
}

/// Nearest preceding non-blank line that is less indented than `idx`
fn parent_line(lines: &[String], idx: usize) -> Option<&str> {
    let width = indent_width(&lines[idx]);
    lines[..idx]
        .iter()
        .rev()
        .find(|line| !is_blank(line) && indent_width(line) < width)
        .map(String::as_str)
}

fn collapse_doubled_braces(line: &str) -> String {
    line.replace("{{", "{").replace("}}", "}")
}

/// Balance the braces of every partition `source =` expression
fn repair_partition_sources(
    lines: &mut [String],
    path: &Path,
    collapse_doubled: bool,
) -> TmdlResult<usize> {
    let mut repaired = 0;
    let mut idx = 0;

    while idx < lines.len() {
        let in_partition = SOURCE_PROPERTY.is_match(&lines[idx])
            && parent_line(lines, idx).is_some_and(|p| PARTITION_HEADER.is_match(p));
        if !in_partition {
            idx += 1;
            continue;
        }

        let source_line = idx;
        let end = block_end(lines, source_line + 1, indent_width(&lines[source_line]));

        if collapse_doubled {
            for line in &mut lines[source_line..end] {
                let collapsed = collapse_doubled_braces(line);
                if collapsed != *line {
                    *line = collapsed;
                    repaired += 1;
                }
            }
        }

        // the property name itself holds no braces, only the text after `=`
        let count = lines[source_line..end]
            .iter()
            .enumerate()
            .map(|(offset, line)| {
                let code = if offset == 0 {
                    line.split_once('=').map(|(_, rest)| rest).unwrap_or("")
                } else {
                    line.as_str()
                };
                BraceCount::of_line(code)
            })
            .fold(BraceCount::default(), |acc, c| acc + c);

        let unbalanced = || TmdlError::UnbalancedExpression {
            path: path.to_path_buf(),
            line: source_line + 1,
            opens: count.opens,
            closes: count.closes,
        };

        let last = (source_line..end)
            .rev()
            .find(|&i| !is_blank(&lines[i]))
            .unwrap_or(source_line);

        match count.imbalance() {
            0 => {}
            1 => {
                let line = &lines[last];
                let code = line[..comment_start(line).unwrap_or(line.len())].trim_end();
                let fixed = format!("{code}}}{}", &line[code.len()..]);
                debug!(path = %path.display(), line = last + 1, "Appended missing '}}'");
                lines[last] = fixed;
                repaired += 1;
            }
            -1 => {
                let Some(brace) = trailing_close_brace(&lines[last]) else {
                    return Err(unbalanced());
                };
                let line = &lines[last];
                let fixed = format!("{}{}", line[..brace].trim_end(), &line[brace + 1..]);
                debug!(path = %path.display(), line = last + 1, "Removed surplus '}}'");
                lines[last] = fixed;
                repaired += 1;
            }
            _ => return Err(unbalanced()),
        }

        idx = end.max(source_line + 1);
    }

    Ok(repaired)
}

/// Remove `columns:` / `partitions:` labels and dedent what they wrapped
fn drop_group_labels(lines: &mut Vec<String>) -> usize {
    let mut removed = 0;
    let mut idx = 0;

    while idx < lines.len() {
        if !GROUP_LABEL.is_match(&lines[idx]) {
            idx += 1;
            continue;
        }

        let label_width = indent_width(&lines[idx]);
        let label_ws = leading_ws(&lines[idx]).to_string();
        lines.remove(idx);
        removed += 1;
        if idx < lines.len() && is_blank(&lines[idx]) {
            lines.remove(idx);
        }

        let end = block_end(lines, idx, label_width);
        let child_width = lines[idx..end]
            .iter()
            .find(|line| !is_blank(line))
            .map(|line| indent_width(line));
        if let Some(child_width) = child_width {
            for line in &mut lines[idx..end] {
                if !is_blank(line) {
                    *line = format!("{label_ws}{}", strip_indent(line, child_width));
                }
            }
        }
        // no advance: the dedented children may hold another label
    }

    removed
}

/// Make sure the table has exactly one table-level `PBI_ResultType`
fn ensure_result_type_annotation(lines: &mut Vec<String>, unit: &str) -> usize {
    let Some(table_idx) = lines.iter().position(|line| TABLE_HEADER.is_match(line)) else {
        return 0;
    };
    let table_width = indent_width(&lines[table_idx]);
    let child_ws = lines[table_idx + 1..]
        .iter()
        .find(|line| !is_blank(line) && indent_width(line) > table_width)
        .map(|line| leading_ws(line).to_string())
        .unwrap_or_else(|| format!("{}{unit}", leading_ws(&lines[table_idx])));
    let child_width = indent_width(&child_ws);

    // table level: no deeper than the first member, or directly under the header
    let view: &[String] = lines;
    let found: Vec<usize> = (table_idx + 1..view.len())
        .filter(|&i| {
            RESULT_TYPE_ANNOTATION.is_match(&view[i])
                && (indent_width(&view[i]) <= child_width
                    || parent_line(view, i).is_some_and(|p| TABLE_HEADER.is_match(p)))
        })
        .collect();

    match found.as_slice() {
        [] => {
            while lines.last().is_some_and(|line| is_blank(line)) {
                lines.pop();
            }
            lines.push(String::new());
            lines.push(format!("{child_ws}annotation PBI_ResultType = Table"));
            1
        }
        [_] => 0,
        [_, duplicates @ ..] => {
            for &i in duplicates.iter().rev() {
                lines.remove(i);
            }
            duplicates.len()
        }
    }
}

/// Re-indent every line to two spaces per nesting level; returns whether
/// anything moved
fn reindent(lines: &mut [String]) -> bool {
    let mut stack: Vec<usize> = Vec::new();
    let mut changed = false;

    for line in lines.iter_mut() {
        if is_blank(line) {
            if !line.is_empty() {
                line.clear();
                changed = true;
            }
            continue;
        }

        let width = indent_width(line);
        while stack.last().is_some_and(|&top| top > width) {
            stack.pop();
        }
        if stack.last().is_none_or(|&top| top < width) {
            stack.push(width);
        }

        let depth = stack.len() - 1;
        let rewritten = format!("{}{}", "  ".repeat(depth), line.trim_start());
        if rewritten != *line {
            *line = rewritten;
            changed = true;
        }
    }

    changed
}

/// The table polishing pass over `<definition>/tables`
#[derive(Debug, Clone)]
pub struct TablePolisher {
    definition_dir: PathBuf,
    options: TablePolishOptions,
}

impl TablePolisher {
    pub fn new(definition_dir: impl Into<PathBuf>) -> Self {
        Self {
            definition_dir: definition_dir.into(),
            options: TablePolishOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TablePolishOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.definition_dir.join(TABLES_DIR)
    }

    /// Polish every table file, stopping at the first error
    pub fn run(&self) -> TmdlResult<PassReport> {
        let tables_dir = self.tables_dir();
        let _span = info_span!("polish_tables", dir = %tables_dir.display()).entered();

        let files = discover_files(&tables_dir, "*.tmdl", false)?;
        let mut report = PassReport::new(PASS_NAME);

        for file in &files {
            let original = read_text(file)?;
            if is_json_like(&original) {
                warn!(path = %file.display(), "Skipping JSON-like file");
                report.skip(file);
                continue;
            }

            let polished = polish_table_text(&original, file, self.options)?;
            if polished.changes > 0 {
                write_atomic(file, &polished.text)?;
                debug!(path = %file.display(), changes = polished.changes, "Polished table");
            }
            report.record(file, polished.changes);
        }

        info!(
            files = report.files_scanned,
            changed = report.files_changed.len(),
            "Table files polished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polish(text: &str) -> TmdlResult<Polished> {
        polish_table_text(text, Path::new("T.tmdl"), TablePolishOptions::default())
    }

    #[test]
    fn test_annotation_at_other_table_indent_not_duplicated() {
        let text = "\
table Orders
    column Region
        dataType: string
  annotation PBI_ResultType = Table
";
        let out = polish(text).unwrap();
        assert_eq!(out.changes, 0);
        assert_eq!(out.text, text);

        let nested = "\
table Orders
  column Region
    dataType: string
    annotation PBI_ResultType = Table
";
        let out = polish(nested).unwrap();
        assert_eq!(out.text.matches("PBI_ResultType").count(), 2);
        assert!(out.text.ends_with("\n\n  annotation PBI_ResultType = Table\n"));
    }

    #[test]
    fn test_drops_group_labels() {
        let text = "\
table Orders
  columns:

    column Region
      dataType: string
  partitions:
    partition Orders = m
      mode: import

  annotation PBI_ResultType = Table
";
        let out = polish(text).unwrap();
        assert_eq!(
            out.text,
            "\
table Orders
  column Region
    dataType: string
  partition Orders = m
    mode: import

  annotation PBI_ResultType = Table
"
        );
        assert_eq!(out.changes, 2);
    }

    #[test]
    fn test_appends_missing_close_brace() {
        let text = "\
table T
  partition T = m
    source = {1, 2, 3
  annotation PBI_ResultType = Table
";
        let out = polish(text).unwrap();
        assert!(out.text.contains("    source = {1, 2, 3}\n"));
        assert_eq!(BraceCount::of(&out.text).imbalance(), 0);
    }

    #[test]
    fn test_removes_trailing_surplus_brace() {
        let text = "\
table T
  partition T = m
    source =
      let
        Source = {1, 2}
      in
        Source} // done
  annotation PBI_ResultType = Table
";
        let out = polish(text).unwrap();
        assert!(out.text.contains("        Source // done\n"));
    }

    #[test]
    fn test_surplus_brace_not_at_end_fails() {
        let text = "\
table T
  partition T = m
    source =
      let
        Source = 1}
      in
        Source
";
        let err = polish(text).unwrap_err();
        assert!(matches!(
            err,
            TmdlError::UnbalancedExpression {
                line: 3,
                opens: 0,
                closes: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_braces_in_strings_do_not_count() {
        let text = "\
table T
  partition T = m
    source = Text.Combine({\"{\", \"}}\"})
  annotation PBI_ResultType = Table
";
        let out = polish(text).unwrap();
        assert_eq!(out.changes, 0);
        assert_eq!(out.text, text);
    }

    #[test]
    fn test_annotation_added_once() {
        let out = polish("table T\n\tcolumn A\n\t\tdataType: string\n\n").unwrap();
        assert_eq!(
            out.text,
            "table T\n\tcolumn A\n\t\tdataType: string\n\n\tannotation PBI_ResultType = Table\n"
        );
        let again = polish(&out.text).unwrap();
        assert_eq!(again.changes, 0);
    }

    #[test]
    fn test_duplicate_annotations_collapsed() {
        let text = "\
table T
  column A
    annotation PBI_ResultType = Table
  annotation PBI_ResultType = Table
  annotation PBI_ResultType = Table
";
        let out = polish(text).unwrap();
        assert_eq!(
            out.text,
            "\
table T
  column A
    annotation PBI_ResultType = Table
  annotation PBI_ResultType = Table
"
        );
    }

    #[test]
    fn test_reindent_and_collapse() {
        let text = "\
table T
    column A
        dataType: string
    partition T = m
        mode: import
        source =
            let
               Source = {{1, 2}}
            in
               Source
    annotation PBI_ResultType = Table
";
        let options = TablePolishOptions {
            reindent: true,
            collapse_doubled_braces: true,
        };
        let out = polish_table_text(text, Path::new("T.tmdl"), options).unwrap();
        assert_eq!(
            out.text,
            "\
table T
  column A
    dataType: string
  partition T = m
    mode: import
    source =
      let
        Source = {1, 2}
      in
        Source
  annotation PBI_ResultType = Table
"
        );
        let again = polish_table_text(&out.text, Path::new("T.tmdl"), options).unwrap();
        assert_eq!(again.changes, 0);
    }
}

//! Integration of generated fragments into table definitions
//!
//! The generator leaves two fragments per table: a column list and a raw
//! query. Integration composes them into `tables/<Table>.tmdl` under a
//! definition folder, makes sure `model.tmdl` and `relationships.tmdl` exist
//! and appends declared relationships once both of their tables are present.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, info_span};

use crate::error::TmdlResult;
use crate::layout::ProjectLayout;
use crate::models::{ColumnSpec, KeepPair, RelationshipsFile, quote_if_needed};
use crate::polish::{RELATIONSHIPS_FILE, TABLES_DIR};
use crate::report::PassReport;
use crate::storage::{discover_files, ensure_dir, read_text, write_atomic};
use crate::tmdl::{Document, indent_width, is_blank, strip_indent};

pub const PASS_NAME: &str = "integrate";

pub const MODEL_FILE: &str = "model.tmdl";

const CHILD_INDENT: &str = "  ";

static COLUMN_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*column\s+\S").unwrap());

static TABLE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*table\s+\S").unwrap());

static NON_COLUMN_MEMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(partition|annotation|measure|hierarchy)\b").unwrap());

/// Fragment files generated for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFragments {
    pub table: String,
    pub columns_file: PathBuf,
    pub partition_file: PathBuf,
}

impl TableFragments {
    /// Fragments at their conventional location under `out/`
    pub fn from_layout(layout: &ProjectLayout, table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns_file: layout.columns_fragment(table),
            partition_file: layout.partition_fragment(table),
        }
    }
}

/// Column blocks for a table from a columns fragment
///
/// TMDL column blocks are kept as written, minus any `table` wrapper or
/// non-column members, and re-indented under the table. Anything else is
/// read as `name,type,summarize` rows.
pub fn render_columns(text: &str) -> Vec<String> {
    if !COLUMN_LINE.is_match(text) {
        return text
            .lines()
            .filter_map(ColumnSpec::parse_row)
            .flat_map(|col| col.to_tmdl_lines(CHILD_INDENT))
            .collect();
    }

    let mut block: Vec<&str> = Vec::new();
    let mut member_width = None;
    for line in text.lines() {
        if TABLE_LINE.is_match(line) {
            continue;
        }
        if !is_blank(line) && COLUMN_LINE.is_match(line) && member_width.is_none() {
            member_width = Some(indent_width(line));
        }
        if let Some(width) = member_width
            && NON_COLUMN_MEMBER.is_match(line)
            && indent_width(line) <= width
        {
            break;
        }
        if member_width.is_some() {
            block.push(line);
        }
    }
    while block.last().is_some_and(|line| is_blank(line)) {
        block.pop();
    }

    let width = member_width.unwrap_or(0);
    block
        .into_iter()
        .map(|line| {
            if is_blank(line) {
                String::new()
            } else {
                format!("{CHILD_INDENT}{}", strip_indent(line, width))
            }
        })
        .collect()
}

/// Wrap a raw `let ... in ...` query as an import partition
pub fn wrap_partition(table: &str, query: &str, collapse_doubled_braces: bool) -> Vec<String> {
    let query = if collapse_doubled_braces {
        query.replace("{{", "{").replace("}}", "}")
    } else {
        query.to_string()
    };

    let mut lines = vec![
        format!("{CHILD_INDENT}partition {} = m", quote_if_needed(table)),
        format!("{CHILD_INDENT}  mode: import"),
        format!("{CHILD_INDENT}  source ="),
    ];

    let has_let = query
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("let"));
    for line in query.lines().filter(|line| !is_blank(line)) {
        let trimmed = line.trim();
        let rendered = if !has_let {
            format!("      {}", line.trim_end())
        } else if trimmed.eq_ignore_ascii_case("let") || trimmed.eq_ignore_ascii_case("in") {
            format!("      {}", trimmed.to_ascii_lowercase())
        } else {
            format!("        {trimmed}")
        };
        lines.push(rendered);
    }
    lines
}

/// Compose the text of `tables/<Table>.tmdl`
pub fn compose_table(
    table: &str,
    columns_text: &str,
    query: &str,
    collapse_doubled_braces: bool,
) -> String {
    let mut lines = vec![format!("table {}", quote_if_needed(table)), String::new()];
    let columns = render_columns(columns_text);
    if !columns.is_empty() {
        lines.extend(columns);
        lines.push(String::new());
    }
    lines.extend(wrap_partition(table, query, collapse_doubled_braces));
    lines.push(String::new());
    lines.push(format!("{CHILD_INDENT}annotation PBI_ResultType = Table"));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Writes table definitions and declared relationships into a definition folder
#[derive(Debug, Clone)]
pub struct Integrator {
    definition_dir: PathBuf,
    relationships: Vec<KeepPair>,
    cross_filtering_behavior: Option<String>,
    collapse_doubled_braces: bool,
}

impl Integrator {
    pub fn new(definition_dir: impl Into<PathBuf>) -> Self {
        Self {
            definition_dir: definition_dir.into(),
            relationships: Vec::new(),
            cross_filtering_behavior: None,
            collapse_doubled_braces: true,
        }
    }

    /// Relationships to declare once both of their tables exist
    pub fn with_relationships(mut self, relationships: Vec<KeepPair>) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn with_cross_filtering_behavior(mut self, behavior: Option<String>) -> Self {
        self.cross_filtering_behavior = behavior;
        self
    }

    pub fn with_collapse_doubled_braces(mut self, collapse: bool) -> Self {
        self.collapse_doubled_braces = collapse;
        self
    }

    pub fn definition_dir(&self) -> &Path {
        &self.definition_dir
    }

    fn tables_dir(&self) -> PathBuf {
        self.definition_dir.join(TABLES_DIR)
    }

    /// Create `tables/`, `model.tmdl` and `relationships.tmdl` when missing
    pub fn ensure_definition_files(&self) -> TmdlResult<()> {
        ensure_dir(&self.tables_dir())?;
        let model = self.definition_dir.join(MODEL_FILE);
        if !model.exists() {
            write_atomic(&model, "model\n")?;
        }
        let relationships = self.definition_dir.join(RELATIONSHIPS_FILE);
        if !relationships.exists() {
            write_atomic(&relationships, "")?;
        }
        Ok(())
    }

    /// Compose and write one table definition; returns the file written
    pub fn integrate_table(&self, fragments: &TableFragments) -> TmdlResult<PathBuf> {
        let columns = read_text(&fragments.columns_file)?;
        let query = read_text(&fragments.partition_file)?;

        self.ensure_definition_files()?;
        let path = self
            .tables_dir()
            .join(format!("{}.tmdl", fragments.table));
        let text = compose_table(
            &fragments.table,
            &columns,
            &query,
            self.collapse_doubled_braces,
        );
        write_atomic(&path, &text)?;
        debug!(table = %fragments.table, path = %path.display(), "Integrated table");
        Ok(path)
    }

    /// Names of the tables with a definition file
    pub fn existing_tables(&self) -> TmdlResult<BTreeSet<String>> {
        let tables_dir = self.tables_dir();
        if !tables_dir.exists() {
            return Ok(BTreeSet::new());
        }
        Ok(discover_files(&tables_dir, "*.tmdl", false)?
            .iter()
            .filter_map(|p| p.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect())
    }

    /// Append declared relationships whose tables both exist and that the
    /// file does not already hold; returns how many were appended
    pub fn append_relationships(&self) -> TmdlResult<usize> {
        if self.relationships.is_empty() {
            return Ok(0);
        }
        self.ensure_definition_files()?;

        let tables = self.existing_tables()?;
        let path = self.definition_dir.join(RELATIONSHIPS_FILE);
        let original = read_text(&path)?;
        let doc = Document::parse(&original);
        let file = RelationshipsFile::parse(&doc.lines);

        let mut lines = doc.lines.clone();
        while lines.last().is_some_and(|line| is_blank(line)) {
            lines.pop();
        }

        let mut appended = 0;
        for pair in &self.relationships {
            let both_exist =
                tables.contains(&pair.left.table) && tables.contains(&pair.right.table);
            let declared = file.relationships().any(|rel| pair.matches(rel));
            if !both_exist || declared {
                continue;
            }

            if !lines.is_empty() {
                lines.push(String::new());
            }
            let name = format!(
                "{}_{}_{}_{}",
                pair.left.table, pair.left.column, pair.right.table, pair.right.column
            )
            .replace(char::is_whitespace, "_");
            lines.push(format!("relationship {name}"));
            lines.push(format!("{CHILD_INDENT}fromColumn: {}", pair.left.to_tmdl()));
            lines.push(format!("{CHILD_INDENT}toColumn: {}", pair.right.to_tmdl()));
            if let Some(behavior) = &self.cross_filtering_behavior {
                lines.push(format!("{CHILD_INDENT}crossFilteringBehavior: {behavior}"));
            }
            appended += 1;
        }

        if appended > 0 {
            let mut text = lines.join("\n");
            text.push('\n');
            write_atomic(&path, &text)?;
        }
        Ok(appended)
    }

    /// Integrate every table, then declare relationships
    pub fn run(&self, tables: &[TableFragments]) -> TmdlResult<PassReport> {
        let _span = info_span!("integrate", dir = %self.definition_dir.display()).entered();
        let mut report = PassReport::new(PASS_NAME);

        for fragments in tables {
            let path = self.integrate_table(fragments)?;
            report.record(&path, 1);
        }
        self.ensure_definition_files()?;

        let appended = self.append_relationships()?;
        report.record(&self.definition_dir.join(RELATIONSHIPS_FILE), appended);

        info!(
            tables = tables.len(),
            relationships = appended,
            "Fragments integrated"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_columns_from_rows() {
        let lines = render_columns("Row_ID,int64,count\nCustomer_ID | string | none\n");
        assert_eq!(
            lines,
            vec![
                "  column Row_ID",
                "    dataType: int64",
                "    summarizeBy: count",
                "    sourceColumn: Row_ID",
                "  column Customer_ID",
                "    dataType: string",
                "    sourceColumn: Customer_ID",
            ]
        );
    }

    #[test]
    fn test_render_columns_from_tmdl() {
        let text = "\
table Orders
    column Region
        dataType: string

    column Sales
        dataType: double
    partition Orders = m
        mode: import
";
        assert_eq!(
            render_columns(text),
            vec![
                "  column Region",
                "    dataType: string",
                "",
                "  column Sales",
                "    dataType: double",
            ]
        );
    }

    #[test]
    fn test_wrap_partition() {
        let query = "let\n  Source = Csv.Document(File.Contents(\"o.csv\")),\n  T = Table.TransformColumnTypes(Source, {{\"A\", type text}})\nIN\n  T\n";
        assert_eq!(
            wrap_partition("Orders", query, true),
            vec![
                "  partition Orders = m",
                "    mode: import",
                "    source =",
                "      let",
                "        Source = Csv.Document(File.Contents(\"o.csv\")),",
                "        T = Table.TransformColumnTypes(Source, {\"A\", type text})",
                "      in",
                "        T",
            ]
        );
    }

    #[test]
    fn test_relationships_appended_once() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        for table in ["Orders", "People"] {
            std::fs::write(out.join(format!("{table}_columns.txt")), "Region,string\n").unwrap();
            std::fs::write(out.join(format!("{table}.m")), "let\n Source = 1\nin\n Source\n")
                .unwrap();
        }
        let fragments: Vec<_> = ["Orders", "People"]
            .iter()
            .map(|t| TableFragments {
                table: t.to_string(),
                columns_file: out.join(format!("{t}_columns.txt")),
                partition_file: out.join(format!("{t}.m")),
            })
            .collect();

        let definition = temp.path().join("definition");
        let integrator = Integrator::new(&definition).with_relationships(
            KeepPair::parse_list(&["Orders.Region=People.Region", "Orders.Order_ID=Returned.Order_ID"])
                .unwrap(),
        );

        let report = integrator.run(&fragments).unwrap();
        assert_eq!(report.files_changed.len(), 3);
        assert_eq!(
            std::fs::read_to_string(definition.join(MODEL_FILE)).unwrap(),
            "model\n"
        );
        let relationships = definition.join(RELATIONSHIPS_FILE);
        let text = std::fs::read_to_string(&relationships).unwrap();
        assert_eq!(
            text,
            "relationship Orders_Region_People_Region\n  fromColumn: Orders.'Region'\n  toColumn: People.'Region'\n"
        );

        integrator.run(&fragments).unwrap();
        assert_eq!(std::fs::read_to_string(&relationships).unwrap(), text);
    }
}

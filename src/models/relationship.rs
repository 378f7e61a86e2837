//! Relationship model for the relationships definition file
//!
//! Only the parts the relationship polisher needs are interpreted: the block
//! name, the two endpoints and the cross-filtering behaviour. Each block keeps
//! its raw lines so retained relationships are written back verbatim.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TmdlError;
use crate::tmdl::expression::comment_start;

static RELATIONSHIP_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*relationship\s+(?P<name>\S.*?)\s*:?\s*$").unwrap());

static PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+(?P<key>fromColumn|toColumn|crossFilteringBehavior|fromCardinality|toCardinality|isActive)\s*:\s*(?P<value>.*?)\s*$")
        .unwrap()
});

static TABLE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<column>.*?) *\((?P<table>[^)]+)\)$").unwrap());

/// Table name prefix Power BI uses for its auto date/time tables
pub const LOCAL_DATE_TABLE_PREFIX: &str = "LocalDateTable_";

/// A `Table.Column` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub table: String,
    pub column: String,
}

impl Endpoint {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse `Table.Column`, `Table.'Column Name'` or `'Table Name'.Column`
    ///
    /// A `Column(Table)` suffix naming the endpoint's own table is dropped, so
    /// `People.'Region (People)'` and `People.Region` are the same endpoint.
    pub fn parse(text: &str) -> Option<Self> {
        let (table, column) = split_qualified(text.trim())?;
        let table = unquote(table);
        let column = strip_table_suffix(&unquote(column), &table);
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self { table, column })
    }

    /// Render the endpoint the way TMDL writes column references
    pub fn to_tmdl(&self) -> String {
        format!("{}.{}", quote_if_needed(&self.table), quote(&self.column))
    }

    pub fn is_local_date_table(&self) -> bool {
        self.table
            .to_ascii_lowercase()
            .starts_with(&LOCAL_DATE_TABLE_PREFIX.to_ascii_lowercase())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Split at the first `.` that is not inside single quotes
fn split_qualified(text: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (idx, ch) in text.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            '.' if !in_quotes => return Some((&text[..idx], &text[idx + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(text: &str) -> String {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            let inner = &text[1..text.len() - 1];
            return inner.replace(&format!("{quote}{quote}"), &quote.to_string());
        }
    }
    text.to_string()
}

fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Quote a table name unless it is a plain identifier
pub fn quote_if_needed(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        quote(name)
    }
}

/// `Region(People)` / `Region (People)` -> `Region` when the table is `People`
pub fn strip_table_suffix(column: &str, table: &str) -> String {
    let column = column.trim();
    if let Some(caps) = TABLE_SUFFIX.captures(column)
        && caps["table"].trim().eq_ignore_ascii_case(table.trim())
    {
        return caps["column"].trim().to_string();
    }
    column.to_string()
}

/// One allow-list entry: `TableA.ColumnA=TableB.ColumnB`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepPair {
    pub left: Endpoint,
    pub right: Endpoint,
    /// The entry as the caller wrote it
    pub raw: String,
}

impl KeepPair {
    /// True when the relationship joins the same two endpoints, either way round
    pub fn matches(&self, rel: &Relationship) -> bool {
        let (Some(from), Some(to)) = (&rel.from, &rel.to) else {
            return false;
        };
        (from == &self.left && to == &self.right) || (from == &self.right && to == &self.left)
    }

    /// Parse entries, splitting comma-joined arguments
    pub fn parse_list<S: AsRef<str>>(entries: &[S]) -> Result<Vec<Self>, TmdlError> {
        entries
            .iter()
            .flat_map(|entry| entry.as_ref().split(','))
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for KeepPair {
    type Err = TmdlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || TmdlError::InvalidAllowListEntry(raw.to_string());
        let (left, right) = raw.split_once('=').ok_or_else(invalid)?;
        Ok(Self {
            left: Endpoint::parse(left).ok_or_else(invalid)?,
            right: Endpoint::parse(right).ok_or_else(invalid)?,
            raw: raw.to_string(),
        })
    }
}

impl fmt::Display for KeepPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.left, self.right)
    }
}

/// A relationship block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,
    pub from: Option<Endpoint>,
    pub to: Option<Endpoint>,
    pub cross_filtering_behavior: Option<String>,
    /// 1-based line of the `relationship` header
    pub start_line: usize,
    /// Header, properties and the blank lines that follow the block
    pub lines: Vec<String>,
}

impl Relationship {
    fn start(name: &str, start_line: usize, header: &str) -> Self {
        Self {
            name: name.to_string(),
            from: None,
            to: None,
            cross_filtering_behavior: None,
            start_line,
            lines: vec![header.to_string()],
        }
    }

    fn absorb(&mut self, line: &str) {
        self.lines.push(line.to_string());
        let code = &line[..comment_start(line).unwrap_or(line.len())];
        let Some(caps) = PROPERTY.captures(code) else {
            return;
        };
        let value = &caps["value"];
        match &caps["key"] {
            "fromColumn" => self.from = Endpoint::parse(value),
            "toColumn" => self.to = Endpoint::parse(value),
            "crossFilteringBehavior" => {
                self.cross_filtering_behavior = Some(value.to_string());
            }
            _ => {}
        }
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.from.iter().chain(self.to.iter())
    }

    /// Auto date/time link generated by Power BI
    pub fn is_local_date_link(&self) -> bool {
        self.endpoints().any(Endpoint::is_local_date_table)
    }

    /// `from -> to` for logs and error listings
    pub fn describe(&self) -> String {
        let side = |e: &Option<Endpoint>| {
            e.as_ref()
                .map(Endpoint::to_string)
                .unwrap_or_else(|| "?".to_string())
        };
        format!("{} -> {}", side(&self.from), side(&self.to))
    }
}

/// A piece of the relationships file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Anything that is not part of a relationship block
    Other(String),
    Relationship(Relationship),
}

/// The relationships definition file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipsFile {
    pub segments: Vec<Segment>,
}

impl RelationshipsFile {
    /// Split lines into relationship blocks; a block runs until the next
    /// unindented non-blank line
    pub fn parse(lines: &[String]) -> Self {
        let mut segments = Vec::new();
        let mut current: Option<Relationship> = None;

        for (idx, line) in lines.iter().enumerate() {
            if let Some(caps) = RELATIONSHIP_HEADER.captures(line) {
                if let Some(rel) = current.take() {
                    segments.push(Segment::Relationship(rel));
                }
                current = Some(Relationship::start(&caps["name"], idx + 1, line));
                continue;
            }

            let continues_block = line.trim().is_empty() || line.starts_with([' ', '\t']);
            match current.as_mut() {
                Some(rel) if continues_block => rel.absorb(line),
                _ => {
                    if let Some(rel) = current.take() {
                        segments.push(Segment::Relationship(rel));
                    }
                    segments.push(Segment::Other(line.clone()));
                }
            }
        }

        if let Some(rel) = current.take() {
            segments.push(Segment::Relationship(rel));
        }
        Self { segments }
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Relationship(rel) => Some(rel),
            Segment::Other(_) => None,
        })
    }

    /// Every endpoint named by some relationship
    pub fn declared_endpoints(&self) -> HashSet<&Endpoint> {
        self.relationships().flat_map(Relationship::endpoints).collect()
    }

    /// Keep only the relationships `keep` accepts, in their original order
    pub fn retain(&mut self, mut keep: impl FnMut(&Relationship) -> bool) -> usize {
        let before = self.segments.len();
        self.segments.retain(|segment| match segment {
            Segment::Relationship(rel) => keep(rel),
            Segment::Other(_) => true,
        });
        before - self.segments.len()
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|segment| match segment {
                Segment::Other(line) => vec![line.clone()],
                Segment::Relationship(rel) => rel.lines.clone(),
            })
            .collect()
    }
}

//! The subset of TMDL the post-processing passes understand
//!
//! This is not a TMDL parser. It models just enough structure to rewrite
//! definition files safely:
//! - [`Document`]: the file as lines, remembering line endings so untouched
//!   files round-trip byte-identically
//! - [`block`]: brace-delimited block headers and the block tree
//! - [`expression`]: brace accounting inside query expressions

pub mod block;
pub mod expression;

pub use block::{Block, BlockHeader, HeaderStyle, Node, parse_nodes, render_nodes};
pub use expression::{BraceCount, BraceScan, scan_block_line};

/// Line terminator used by a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A definition file split into lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub lines: Vec<String>,
    pub line_ending: LineEnding,
    pub trailing_newline: bool,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let line_ending = if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };

        let mut lines: Vec<String> = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();
        let trailing_newline = text.ends_with('\n');
        if trailing_newline || text.is_empty() {
            lines.pop();
        }

        Self {
            lines,
            line_ending,
            trailing_newline,
        }
    }

    /// Build a document that reuses this one's line ending conventions
    pub fn with_lines(&self, lines: Vec<String>) -> Self {
        Self {
            lines,
            line_ending: self.line_ending,
            trailing_newline: self.trailing_newline,
        }
    }

    pub fn render(&self) -> String {
        let ending = self.line_ending.as_str();
        let mut out = self.lines.join(ending);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(ending);
        }
        out
    }

    /// One level of indentation as used by this file: a tab if any line is
    /// tab-indented, two spaces otherwise
    pub fn indent_unit(&self) -> &'static str {
        let uses_tabs = self
            .lines
            .iter()
            .any(|line| line.starts_with('\t') && !line.trim().is_empty());
        if uses_tabs { "\t" } else { "  " }
    }
}

/// Leading whitespace of a line
pub fn leading_ws(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

/// Visual indentation width, counting a tab as four columns
pub fn indent_width(line: &str) -> usize {
    leading_ws(line)
        .chars()
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Remove up to `width` columns of leading whitespace
pub fn strip_indent(line: &str, width: usize) -> &str {
    let mut consumed = 0;
    let mut offset = 0;
    for ch in line.chars() {
        if consumed >= width {
            break;
        }
        match ch {
            ' ' => consumed += 1,
            '\t' => consumed += 4,
            _ => break,
        }
        offset += ch.len_utf8();
    }
    &line[offset..]
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

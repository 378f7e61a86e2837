//! Brace-delimited blocks and the block tree
//!
//! Three header forms open a brace block:
//!
//! ```text
//! column Sales = {        Assigned     -> column Sales:
//! table Orders {          Declaration  -> table Orders
//! columns {               Group        -> columns:
//! ```
//!
//! Everything else is a plain [`Node::Line`] and is never touched.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::expression::{BraceCount, comment_start, scan_block_line};
use super::{indent_width, is_blank, strip_indent};
use crate::error::{TmdlError, TmdlResult};

static ASSIGNED_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<indent>[ \t]*)(?P<keyword>column|partition|measure|hierarchy|level|calculationItem|relationship)\s+(?P<name>[^={}]+?)\s*=\s*\{(?P<rest>.*)$",
    )
    .unwrap()
});

static DECLARATION_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<indent>[ \t]*)(?P<keyword>table|model|relationship|database|culture|role|perspective)(?:\s+(?P<name>[^={}]*?))?\s*\{(?P<rest>.*)$",
    )
    .unwrap()
});

static GROUP_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<indent>[ \t]*)(?P<keyword>columns|measures|hierarchies|levels|partitions|annotations|calculationGroups?|dataAccessOptions|legacyRedirects|formatStringDefinition|displayFolders|roles|tables|relationships)\s*\{(?P<rest>.*)$",
    )
    .unwrap()
});

/// How a block header was written in brace style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStyle {
    /// `column X = {`
    Assigned,
    /// `table X {`
    Declaration,
    /// `columns {`
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub indent: String,
    pub keyword: String,
    pub name: Option<String>,
    pub style: HeaderStyle,
    /// Trailing `//` comment on the header line
    pub comment: Option<String>,
}

impl BlockHeader {
    /// Match a brace-style header, returning it with the text after the `{`
    pub fn parse(line: &str) -> Option<(Self, &str)> {
        let (caps, style) = if let Some(caps) = ASSIGNED_HEADER.captures(line) {
            (caps, HeaderStyle::Assigned)
        } else if let Some(caps) = GROUP_HEADER.captures(line) {
            (caps, HeaderStyle::Group)
        } else if let Some(caps) = DECLARATION_HEADER.captures(line) {
            (caps, HeaderStyle::Declaration)
        } else {
            return None;
        };

        // a `{` inside a trailing comment does not open anything
        let brace_at = caps.name("rest").map(|m| m.start())?.saturating_sub(1);
        if comment_start(line).is_some_and(|c| c < brace_at) {
            return None;
        }

        let name = caps
            .name("name")
            .map(|m| m.as_str().trim().to_string())
            .filter(|n| !n.is_empty());
        let header = Self {
            indent: caps["indent"].to_string(),
            keyword: caps["keyword"].to_string(),
            name,
            style,
            comment: None,
        };
        let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
        Some((header, rest))
    }

    /// The label-style form of this header
    pub fn to_label(&self) -> String {
        let mut out = format!("{}{}", self.indent, self.keyword);
        if let Some(name) = &self.name {
            out.push(' ');
            out.push_str(name);
        }
        if self.style != HeaderStyle::Declaration {
            out.push(':');
        }
        if let Some(comment) = &self.comment {
            out.push(' ');
            out.push_str(comment);
        }
        out
    }
}

/// A converted brace block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    /// 1-based line of the header in the source file
    pub start_line: usize,
    pub body: Vec<Node>,
    /// Comment found after the closing brace, kept on its own line
    pub closing_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Line(String),
    Block(Block),
}

impl Node {
    /// Number of brace blocks in this subtree
    pub fn block_count(&self) -> usize {
        match self {
            Node::Line(_) => 0,
            Node::Block(block) => {
                1 + block.body.iter().map(Node::block_count).sum::<usize>()
            }
        }
    }
}

/// One line of a block body, tagged with its source line number
struct BodyLine {
    number: usize,
    text: String,
    /// Text that shared a line with a brace and has no indentation of its own
    inline: bool,
}

/// Parse `lines` into a tree, converting every brace block found
///
/// `first_line` is the 1-based source line number of `lines[0]`; `unit` is
/// one indentation level.
pub fn parse_nodes(
    lines: &[String],
    first_line: usize,
    unit: &str,
    path: &Path,
) -> TmdlResult<Vec<Node>> {
    let numbered: Vec<(usize, String)> = lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (first_line + idx, line.clone()))
        .collect();
    parse_numbered(&numbered, unit, path)
}

fn parse_numbered(lines: &[(usize, String)], unit: &str, path: &Path) -> TmdlResult<Vec<Node>> {
    let mut nodes = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let (number, line) = &lines[idx];
        let Some((mut header, rest)) = BlockHeader::parse(line) else {
            nodes.push(Node::Line(line.clone()));
            idx += 1;
            continue;
        };

        let mut body = Vec::new();
        let mut closing_comment = None;
        let mut trailers = Vec::new();

        let scan = scan_block_line(rest, 1);
        let mut depth = scan.depth;
        match scan.close_at {
            Some(pos) => {
                push_inline(&mut body, *number, &rest[..pos]);
                split_trailer(&rest[pos + 1..], &mut closing_comment, &mut trailers)
                    .map_err(|message| malformed(path, *number, message))?;
                idx += 1;
            }
            None => {
                let opening = rest.trim();
                if opening.starts_with("//") {
                    header.comment = Some(opening.to_string());
                } else {
                    push_inline(&mut body, *number, rest);
                }

                let mut cursor = idx + 1;
                loop {
                    let Some((body_number, body_line)) = lines.get(cursor) else {
                        return Err(TmdlError::MalformedBlock {
                            path: path.to_path_buf(),
                            line: *number,
                            message: format!(
                                "'{}' is never closed ({depth} unmatched '{{')",
                                line.trim()
                            ),
                        });
                    };
                    let scan = scan_block_line(body_line, depth);
                    depth = scan.depth;
                    if let Some(pos) = scan.close_at {
                        let before = &body_line[..pos];
                        if !is_blank(before) {
                            body.push(BodyLine {
                                number: *body_number,
                                text: before.trim_end().to_string(),
                                inline: false,
                            });
                        }
                        split_trailer(&body_line[pos + 1..], &mut closing_comment, &mut trailers)
                            .map_err(|message| malformed(path, *body_number, message))?;
                        check_block_end(lines, cursor, &header, path)?;
                        break;
                    }
                    body.push(BodyLine {
                        number: *body_number,
                        text: body_line.clone(),
                        inline: false,
                    });
                    cursor += 1;
                }
                idx = cursor + 1;
            }
        }

        let child_indent = format!("{}{}", header.indent, unit);
        let reindented = reindent_body(&body, &child_indent);
        let mut children = parse_numbered(&reindented, unit, path)?;
        children.extend(
            trailers
                .into_iter()
                .map(|text| Node::Line(format!("{child_indent}{text}"))),
        );

        nodes.push(Node::Block(Block {
            header,
            start_line: *number,
            body: children,
            closing_comment,
        }));
    }

    Ok(nodes)
}

fn push_inline(body: &mut Vec<BodyLine>, number: usize, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        body.push(BodyLine {
            number,
            text: text.to_string(),
            inline: true,
        });
    }
}

fn malformed(path: &Path, line: usize, message: String) -> TmdlError {
    TmdlError::MalformedBlock {
        path: path.to_path_buf(),
        line,
        message,
    }
}

/// Split whatever follows a closing brace into a comment and stray text
///
/// Stray text holding a code brace means the braces before it were unbalanced.
fn split_trailer(
    after: &str,
    comment: &mut Option<String>,
    trailers: &mut Vec<String>,
) -> Result<(), String> {
    let after = after.trim().trim_start_matches([',', ';']).trim();
    if after.is_empty() {
        return Ok(());
    }
    if after.starts_with("//") {
        *comment = Some(after.to_string());
        return Ok(());
    }
    let count = BraceCount::of_line(after);
    if count.opens > 0 || count.closes > 0 {
        return Err(format!("unmatched brace after the closing '}}': '{after}'"));
    }
    trailers.push(after.to_string());
    Ok(())
}

/// A block closed at `close` must not be followed by lines indented deeper
/// than its header; those would be body lines cut off by a surplus `}`
fn check_block_end(
    lines: &[(usize, String)],
    close: usize,
    header: &BlockHeader,
    path: &Path,
) -> TmdlResult<()> {
    let header_width = indent_width(&header.indent);
    let next = lines[close + 1..]
        .iter()
        .find(|(_, line)| !is_blank(line));
    match next {
        Some((number, line)) if indent_width(line) > header_width => Err(malformed(
            path,
            lines[close].0,
            format!(
                "surplus '}}' closes '{}' before line {number}",
                header.to_label().trim()
            ),
        )),
        _ => Ok(()),
    }
}

/// Shift body lines so their shallowest line sits at `child_indent`
fn reindent_body(body: &[BodyLine], child_indent: &str) -> Vec<(usize, String)> {
    let base = body
        .iter()
        .filter(|line| !line.inline && !is_blank(&line.text))
        .map(|line| indent_width(&line.text))
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|line| {
            let text = if is_blank(&line.text) {
                String::new()
            } else if line.inline {
                format!("{child_indent}{}", line.text)
            } else {
                format!("{child_indent}{}", strip_indent(&line.text, base))
            };
            (line.number, text)
        })
        .collect()
}

/// Flatten a node tree back into lines, in label style
pub fn render_nodes(nodes: &[Node], unit: &str) -> Vec<String> {
    let mut out = Vec::new();
    for node in nodes {
        match node {
            Node::Line(line) => out.push(line.clone()),
            Node::Block(block) => {
                out.push(block.header.to_label());
                out.extend(render_nodes(&block.body, unit));
                if let Some(comment) = &block.closing_comment {
                    out.push(format!("{}{}{}", block.header.indent, unit, comment));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    fn convert(text: &str) -> Vec<String> {
        let nodes = parse_nodes(&lines(text), 1, "  ", Path::new("t.tmdl")).unwrap();
        render_nodes(&nodes, "  ")
    }

    #[test]
    fn test_header_forms() {
        let (h, rest) = BlockHeader::parse("  column Sales = { dataType: double }").unwrap();
        assert_eq!(h.style, HeaderStyle::Assigned);
        assert_eq!(h.name.as_deref(), Some("Sales"));
        assert_eq!(rest, " dataType: double }");
        assert_eq!(h.to_label(), "  column Sales:");

        let (h, _) = BlockHeader::parse("table Orders {").unwrap();
        assert_eq!(h.style, HeaderStyle::Declaration);
        assert_eq!(h.to_label(), "table Orders");

        let (h, _) = BlockHeader::parse("  partitions {").unwrap();
        assert_eq!(h.style, HeaderStyle::Group);
        assert_eq!(h.to_label(), "  partitions:");

        assert!(BlockHeader::parse("  column Sales:").is_none());
        assert!(BlockHeader::parse("      Source = Table.FromRows({").is_none());
        assert!(BlockHeader::parse("  expression Ids = {1, 2}").is_none());
        assert!(BlockHeader::parse("  // column X = {").is_none());
    }

    #[test]
    fn test_inline_block() {
        assert_eq!(
            convert("column X = { type: string }"),
            vec!["column X:", "  type: string"]
        );
    }

    #[test]
    fn test_multiline_block_with_nested_braces_and_comments() {
        let text = "\
table Orders {
  partition Orders = { // imported
      mode: import
      source = Source{[Item=\"Orders\"]}[Data] // keep
  } // end partition
}";
        assert_eq!(
            convert(text),
            vec![
                "table Orders",
                "  partition Orders: // imported",
                "    mode: import",
                "    source = Source{[Item=\"Orders\"]}[Data] // keep",
                "    // end partition",
            ]
        );
    }

    #[test]
    fn test_unclosed_block_reports_header_line() {
        let text = "table T\n\n  column A = {\n    dataType: string\n";
        let err = parse_nodes(&lines(text), 1, "  ", Path::new("T.tmdl")).unwrap_err();
        match err {
            TmdlError::MalformedBlock { path, line, .. } => {
                assert_eq!(path, PathBuf::from("T.tmdl"));
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_surplus_close_inside_block_is_malformed() {
        let text = "table T\n  column A = {\n    x = {1, 2}}\n    dataType: string\n  }\n";
        let err = parse_nodes(&lines(text), 1, "  ", Path::new("T.tmdl")).unwrap_err();
        assert!(matches!(err, TmdlError::MalformedBlock { line: 3, .. }));

        let text = "table T\n  column A = {\n    dataType: string\n    }\n    summarizeBy: none\n  }\n";
        let err = parse_nodes(&lines(text), 1, "  ", Path::new("T.tmdl")).unwrap_err();
        assert!(matches!(err, TmdlError::MalformedBlock { line: 4, .. }));
    }

    #[test]
    fn test_brace_after_inline_close_is_malformed() {
        let err = parse_nodes(
            &lines("column X = { x = {1}} }"),
            1,
            "  ",
            Path::new("X.tmdl"),
        )
        .unwrap_err();
        assert!(matches!(err, TmdlError::MalformedBlock { line: 1, .. }));
    }

    #[test]
    fn test_unclosed_nested_brace_is_malformed() {
        let text = "table T\n  column A = {\n    x = {1, 2\n    dataType: string\n  }\n";
        let err = parse_nodes(&lines(text), 1, "  ", Path::new("T.tmdl")).unwrap_err();
        assert!(matches!(err, TmdlError::MalformedBlock { line: 2, .. }));
    }

    #[test]
    fn test_label_style_untouched() {
        let text = "table T\n  column A:\n    dataType: string\n";
        let nodes = parse_nodes(&lines(text), 1, "  ", Path::new("T.tmdl")).unwrap();
        assert_eq!(nodes.iter().map(Node::block_count).sum::<usize>(), 0);
        assert_eq!(render_nodes(&nodes, "  "), lines(text));
    }
}

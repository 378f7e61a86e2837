//! Brace accounting for query expressions
//!
//! Braces inside string literals (`"..."`, with `""` as the escaped quote) and
//! after a `//` line comment are not code and never count. Strings do not
//! span lines in the expressions we rewrite, so every line starts outside a
//! string.

/// Iterator over the code characters of a single line
struct CodeChars<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    in_string: bool,
    comment_at: Option<usize>,
}

impl<'a> CodeChars<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            chars: line.char_indices().peekable(),
            in_string: false,
            comment_at: None,
        }
    }
}

impl Iterator for CodeChars<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        if self.comment_at.is_some() {
            return None;
        }
        while let Some((idx, ch)) = self.chars.next() {
            if self.in_string {
                if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '/' if matches!(self.chars.peek(), Some((_, '/'))) => {
                    self.comment_at = Some(idx);
                    return None;
                }
                _ => return Some((idx, ch)),
            }
        }
        None
    }
}

/// Byte offset where a trailing `//` comment starts, if the line has one
pub fn comment_start(line: &str) -> Option<usize> {
    let mut chars = CodeChars::new(line);
    for _ in chars.by_ref() {}
    chars.comment_at
}

/// Result of scanning one line of a brace block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BraceScan {
    /// Depth after the line (or at the closing brace)
    pub depth: usize,
    /// Byte offset of the brace that brought the depth to zero
    pub close_at: Option<usize>,
}

/// Scan `line` starting at `depth`, stopping at the brace that closes depth 1
pub fn scan_block_line(line: &str, depth: usize) -> BraceScan {
    let mut depth = depth;
    for (idx, ch) in CodeChars::new(line) {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return BraceScan {
                        depth,
                        close_at: Some(idx),
                    };
                }
            }
            _ => {}
        }
    }
    BraceScan {
        depth,
        close_at: None,
    }
}

/// Number of opening and closing braces in a piece of code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BraceCount {
    pub opens: usize,
    pub closes: usize,
}

impl BraceCount {
    /// Count code braces across every line of `text`
    pub fn of(text: &str) -> Self {
        text.lines().fold(Self::default(), |acc, line| acc + Self::of_line(line))
    }

    /// Count code braces in a single line
    pub fn of_line(line: &str) -> Self {
        let mut count = Self::default();
        for (_, ch) in CodeChars::new(line) {
            match ch {
                '{' => count.opens += 1,
                '}' => count.closes += 1,
                _ => {}
            }
        }
        count
    }

    pub fn is_balanced(&self) -> bool {
        self.opens == self.closes
    }

    /// Opens minus closes
    pub fn imbalance(&self) -> isize {
        self.opens as isize - self.closes as isize
    }
}

impl std::ops::Add for BraceCount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            opens: self.opens + rhs.opens,
            closes: self.closes + rhs.closes,
        }
    }
}

/// Byte offset of the last code `}` on the line, ignoring trailing whitespace
/// and comments; `None` unless the code part of the line ends with it
pub fn trailing_close_brace(line: &str) -> Option<usize> {
    let code_end = comment_start(line).unwrap_or(line.len());
    let code = line[..code_end].trim_end();
    if code.ends_with('}') {
        let idx = code.len() - 1;
        // a `}` at the end of an unterminated string literal is not code
        let last_code = CodeChars::new(line).filter(|(_, ch)| *ch == '}').last();
        if last_code.map(|(i, _)| i) == Some(idx) {
            return Some(idx);
        }
    }
    None
}

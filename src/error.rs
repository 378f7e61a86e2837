//! Error types for the TMDL post-processing passes
//!
//! Every pass aborts on the first error. Variants carry the file path and,
//! where it makes sense, the 1-based line number so CLI output can point the
//! user at the offending spot.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the normalizer and the polishing passes
#[derive(Error, Debug)]
pub enum TmdlError {
    /// A brace-delimited block never reaches its closing brace
    #[error("Malformed block in {} starting at line {line}: {message}", path.display())]
    MalformedBlock {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A partition expression is off by more than one brace
    #[error(
        "Unbalanced expression in {} at line {line}: {opens} '{{' vs {closes} '}}'",
        path.display()
    )]
    UnbalancedExpression {
        path: PathBuf,
        line: usize,
        opens: usize,
        closes: usize,
    },

    /// An allow-list entry references an endpoint no relationship declares
    #[error(
        "Unknown endpoint '{endpoint}' in allow-list entry '{entry}' ({})",
        path.display()
    )]
    UnknownEndpoint {
        path: PathBuf,
        entry: String,
        endpoint: String,
    },

    /// An allow-list entry is not of the form `Table.Column=Table.Column`
    #[error("Invalid allow-list entry '{0}': expected Table.Column=Table.Column")]
    InvalidAllowListEntry(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Access to a file was denied
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Any other IO failure, with the path it happened on
    #[error("IO error with {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for TMDL passes
pub type TmdlResult<T> = Result<T, TmdlError>;

impl TmdlError {
    /// Classify an IO error for `path` into the matching variant
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => TmdlError::FileNotFound(path),
            io::ErrorKind::PermissionDenied => TmdlError::PermissionDenied(path),
            _ => TmdlError::Io { path, source },
        }
    }

    /// Path of the file the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            TmdlError::MalformedBlock { path, .. }
            | TmdlError::UnbalancedExpression { path, .. }
            | TmdlError::UnknownEndpoint { path, .. }
            | TmdlError::FileNotFound(path)
            | TmdlError::PermissionDenied(path)
            | TmdlError::Io { path, .. } => Some(path),
            TmdlError::InvalidAllowListEntry(_) => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            TmdlError::MalformedBlock { .. } => format!(
                "{self}\n\nHint: a brace block is missing its closing '}}'. The file was left unchanged."
            ),
            TmdlError::UnbalancedExpression { .. } => format!(
                "{self}\n\nHint: the partition query is off by more than one brace; fix it by hand. The file was left unchanged."
            ),
            TmdlError::UnknownEndpoint { .. } => format!(
                "{self}\n\nHint: check the --keep entry for a typo; endpoints must match a declared relationship."
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_classifies_kinds() {
        let err = TmdlError::from_io(
            "/tmp/missing.tmdl",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, TmdlError::FileNotFound(_)));

        let err = TmdlError::from_io(
            "/tmp/locked.tmdl",
            io::Error::new(io::ErrorKind::PermissionDenied, "no"),
        );
        assert!(matches!(err, TmdlError::PermissionDenied(_)));

        let err = TmdlError::from_io("/tmp/x", io::Error::other("boom"));
        assert!(matches!(err, TmdlError::Io { .. }));
        assert_eq!(err.path(), Some(Path::new("/tmp/x")));
    }

    #[test]
    fn test_display_names_file_and_line() {
        let err = TmdlError::UnbalancedExpression {
            path: PathBuf::from("tables/Orders.tmdl"),
            line: 12,
            opens: 5,
            closes: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("tables/Orders.tmdl"));
        assert!(msg.contains("line 12"));
        assert!(msg.contains("5 '{'"));
        assert!(err.user_message().contains("Hint:"));
    }
}

//! Summary returned by each post-processing pass

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Name of the pass that produced the report
    pub pass: String,
    pub files_scanned: usize,
    /// Files rewritten on disk
    pub files_changed: Vec<PathBuf>,
    /// Files left alone because they did not look like TMDL
    pub files_skipped: Vec<PathBuf>,
    /// Individual rewrites applied (blocks converted, labels dropped, ...)
    pub changes: usize,
}

impl PassReport {
    pub fn new(pass: impl Into<String>) -> Self {
        Self {
            pass: pass.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, path: &Path, changes: usize) {
        self.files_scanned += 1;
        if changes > 0 {
            self.files_changed.push(path.to_path_buf());
            self.changes += changes;
        }
    }

    pub fn skip(&mut self, path: &Path) {
        self.files_scanned += 1;
        self.files_skipped.push(path.to_path_buf());
    }

    pub fn is_noop(&self) -> bool {
        self.files_changed.is_empty()
    }

    /// One-line summary for CLI output
    pub fn summary(&self) -> String {
        format!(
            "{}: {} file(s) scanned, {} changed, {} rewrite(s)",
            self.pass,
            self.files_scanned,
            self.files_changed.len(),
            self.changes
        )
    }
}

//! Relationship filtering
//!
//! Keeps the relationships named by an allow-list of
//! `TableA.ColumnA=TableB.ColumnB` entries and can drop Power BI's
//! auto-generated `LocalDateTable_*` links. Entries are validated against the
//! declared relationships before anything is written.

use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span, warn};

use crate::error::{TmdlError, TmdlResult};
use crate::models::{KeepPair, Relationship, RelationshipsFile};
use crate::report::PassReport;
use crate::storage::{read_text, write_atomic};
use crate::tmdl::Document;

pub const PASS_NAME: &str = "polish-relationships";

pub const RELATIONSHIPS_FILE: &str = "relationships.tmdl";

/// The relationship polishing pass over `<definition>/relationships.tmdl`
#[derive(Debug, Clone)]
pub struct RelationshipPolisher {
    definition_dir: PathBuf,
    keep: Vec<KeepPair>,
    drop_local_date_table: bool,
}

impl RelationshipPolisher {
    pub fn new(definition_dir: impl Into<PathBuf>) -> Self {
        Self {
            definition_dir: definition_dir.into(),
            keep: Vec::new(),
            drop_local_date_table: false,
        }
    }

    pub fn with_keep(mut self, keep: Vec<KeepPair>) -> Self {
        self.keep = keep;
        self
    }

    /// Parse and add allow-list entries; comma-joined entries are split
    pub fn with_keep_entries<S: AsRef<str>>(mut self, entries: &[S]) -> TmdlResult<Self> {
        self.keep.extend(KeepPair::parse_list(entries)?);
        Ok(self)
    }

    pub fn with_drop_local_date_table(mut self, drop: bool) -> Self {
        self.drop_local_date_table = drop;
        self
    }

    pub fn relationships_path(&self) -> PathBuf {
        self.definition_dir.join(RELATIONSHIPS_FILE)
    }

    /// Whether a relationship survives the filter
    ///
    /// With the flag set, auto-date links are dropped outright. Any
    /// relationship is then kept when the allow-list is empty, or when some
    /// entry matches it.
    pub fn should_keep(&self, rel: &Relationship) -> bool {
        if self.drop_local_date_table && rel.is_local_date_link() {
            return false;
        }
        self.keep.is_empty() || self.keep.iter().any(|pair| pair.matches(rel))
    }

    /// Every side of every entry must be an endpoint of some declared relationship
    fn validate(&self, file: &RelationshipsFile, path: &Path) -> TmdlResult<()> {
        let declared = file.declared_endpoints();
        for pair in &self.keep {
            for endpoint in [&pair.left, &pair.right] {
                if !declared.contains(endpoint) {
                    return Err(TmdlError::UnknownEndpoint {
                        path: path.to_path_buf(),
                        entry: pair.raw.clone(),
                        endpoint: endpoint.to_string(),
                    });
                }
            }
            if !file.relationships().any(|rel| pair.matches(rel)) {
                warn!(entry = %pair.raw, "Allow-list entry matches no relationship");
            }
        }
        Ok(())
    }

    pub fn run(&self) -> TmdlResult<PassReport> {
        let path = self.relationships_path();
        let _span = info_span!("polish_relationships", path = %path.display()).entered();

        let original = read_text(&path)?;
        let doc = Document::parse(&original);
        let mut file = RelationshipsFile::parse(&doc.lines);
        self.validate(&file, &path)?;

        let before = file.relationships().count();
        let removed = file.retain(|rel| {
            let keep = self.should_keep(rel);
            if !keep {
                debug!(name = %rel.name, link = %rel.describe(), "Dropping relationship");
            }
            keep
        });

        let mut report = PassReport::new(PASS_NAME);
        if removed > 0 {
            write_atomic(&path, &doc.with_lines(file.to_lines()).render())?;
        }
        report.record(&path, removed);

        info!(
            kept = before - removed,
            removed,
            "Relationships polished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RELATIONSHIPS: &str = "\
relationship People_Region_Orders_Region
  fromColumn: People.'Region'
  toColumn: Orders.'Region'

relationship Orders_Order_ID_Returned_Order_ID
  fromColumn: Orders.'Order_ID'
  toColumn: Returned.'Order_ID'

relationship 9d1e0c
  fromColumn: Orders.'Order_Date'
  toColumn: LocalDateTable_5f2a.Date
";

    fn write_fixture(temp: &TempDir) -> PathBuf {
        let path = temp.path().join(RELATIONSHIPS_FILE);
        std::fs::write(&path, RELATIONSHIPS).unwrap();
        path
    }

    #[test]
    fn test_empty_allow_list_with_flag_drops_only_auto_date() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp);

        let report = RelationshipPolisher::new(temp.path())
            .with_drop_local_date_table(true)
            .run()
            .unwrap();
        assert_eq!(report.changes, 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Orders_Order_ID_Returned_Order_ID"));
        assert!(!text.contains("LocalDateTable_"));
    }

    #[test]
    fn test_nothing_removed_leaves_file_untouched() {
        let temp = TempDir::new().unwrap();
        let path = write_fixture(&temp);

        let report = RelationshipPolisher::new(temp.path()).run().unwrap();
        assert!(report.is_noop());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), RELATIONSHIPS);
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let err = RelationshipPolisher::new("unused")
            .with_keep_entries(&["Orders.Region People.Region"])
            .unwrap_err();
        assert!(matches!(err, TmdlError::InvalidAllowListEntry(_)));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = RelationshipPolisher::new(temp.path()).run().unwrap_err();
        assert!(matches!(err, TmdlError::FileNotFound(_)));
    }
}

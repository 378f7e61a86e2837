//! Project folder conventions
//!
//! ```text
//! <root>/
//!   datasource.xml, prompt.txt, .env
//!   pbip_template/                       template assets
//!   out/                                 generated fragments per table
//!   OUT_PBIP/<Base>.pbip/SemanticModel/  intermediate definition (integrate)
//!   OUT_PBIP/<Base>/                     final project (scaffold, passes)
//! ```

use std::path::{Path, PathBuf};

pub const TEMPLATE_DIR: &str = "pbip_template";
pub const FRAGMENTS_DIR: &str = "out";
pub const OUTPUT_DIR: &str = "OUT_PBIP";
pub const DEFINITION_DIR: &str = "definition";

/// Strip a trailing `.pbip` from a project name
pub fn base_name(pbip_name: &str) -> &str {
    pbip_name.strip_suffix(".pbip").unwrap_or(pbip_name)
}

/// Paths of one PBIP project under a project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    base: String,
}

impl ProjectLayout {
    /// `pbip_name` may be given with or without the `.pbip` suffix
    pub fn new(root: impl Into<PathBuf>, pbip_name: &str) -> Self {
        Self {
            root: root.into(),
            base: base_name(pbip_name).to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join(TEMPLATE_DIR)
    }

    pub fn fragments_dir(&self) -> PathBuf {
        self.root.join(FRAGMENTS_DIR)
    }

    pub fn columns_fragment(&self, table: &str) -> PathBuf {
        self.fragments_dir()
            .join(format!("{table}_columns_boss_style.txt"))
    }

    pub fn partition_fragment(&self, table: &str) -> PathBuf {
        self.fragments_dir().join(format!("{table}_partition.m"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Where integration writes table definitions before scaffolding
    pub fn intermediate_definition_dir(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}.pbip", self.base))
            .join("SemanticModel")
            .join(DEFINITION_DIR)
    }

    /// `OUT_PBIP/<Base>`
    pub fn project_dir(&self) -> PathBuf {
        self.output_dir().join(&self.base)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_dir().join(format!("{}.pbip", self.base))
    }

    pub fn report_dir(&self) -> PathBuf {
        self.project_dir().join(format!("{}.Report", self.base))
    }

    pub fn semantic_model_dir(&self) -> PathBuf {
        self.project_dir()
            .join(format!("{}.SemanticModel", self.base))
    }

    /// The definition folder the post-processing passes run on
    pub fn definition_dir(&self) -> PathBuf {
        self.semantic_model_dir().join(DEFINITION_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = ProjectLayout::new("/proj", "SampleTableau.pbip");
        assert_eq!(layout.base(), "SampleTableau");
        assert_eq!(
            layout.definition_dir(),
            PathBuf::from("/proj/OUT_PBIP/SampleTableau/SampleTableau.SemanticModel/definition")
        );
        assert_eq!(
            layout.intermediate_definition_dir(),
            PathBuf::from("/proj/OUT_PBIP/SampleTableau.pbip/SemanticModel/definition")
        );
        assert_eq!(
            layout.columns_fragment("Orders"),
            PathBuf::from("/proj/out/Orders_columns_boss_style.txt")
        );
        assert_eq!(ProjectLayout::new("/proj", "Sales").base(), "Sales");
    }
}

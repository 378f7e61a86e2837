//! PBIP project scaffolding from a template folder
//!
//! Builds `OUT_PBIP/<Base>/` with the manifest, the report folder and the
//! semantic model. Report and model metadata come from the template. Table
//! definitions, `database.tmdl` and `relationships.tmdl` are taken from the
//! integrated definition when it has usable (non-JSON) files.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::error::TmdlError;
use crate::layout::{DEFINITION_DIR, ProjectLayout};
use crate::polish::{RELATIONSHIPS_FILE, TABLES_DIR};
use crate::storage::{
    copy_dir_all, copy_file, discover_files, ensure_dir, is_json_like, read_text, remove_dir_all,
    write_atomic,
};

pub const TEMPLATE_MANIFEST: &str = "PBIPTemplate.pbip";
pub const TEMPLATE_REPORT: &str = "rtemplate.Report";
pub const TEMPLATE_SEMANTIC_MODEL: &str = "smtemplate.SemanticModel";

const REPORT_PLACEHOLDER: &str = "@@.Report@@";
const SEMANTIC_MODEL_PLACEHOLDER: &str = "@@.SemanticModel@@";
const TABLE_LIST_PLACEHOLDER: &str = "@@tablenamelist@@";
const TABLE_REF_PLACEHOLDER: &str = "@@reftable@@";

/// Errors raised while scaffolding
#[derive(Error, Debug)]
pub enum ScaffoldError {
    /// A required template file or folder does not exist
    #[error("Missing template asset {label}: {}", path.display())]
    MissingTemplateAsset { label: String, path: PathBuf },

    /// Neither the integrated definition nor the template has table files
    #[error("No table definitions found to copy")]
    NoTables,

    #[error(transparent)]
    Storage(#[from] TmdlError),
}

pub type ScaffoldResult<T> = Result<T, ScaffoldError>;

/// What a scaffold run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldSummary {
    pub manifest: PathBuf,
    pub report_dir: PathBuf,
    pub semantic_model_dir: PathBuf,
    pub tables: Vec<String>,
}

/// Materializes a PBIP project for a layout
pub trait Scaffolder {
    fn scaffold(&self, layout: &ProjectLayout, force: bool) -> ScaffoldResult<ScaffoldSummary>;
}

/// Scaffolder backed by `<root>/pbip_template`
#[derive(Debug, Clone, Default)]
pub struct TemplateScaffolder;

impl TemplateScaffolder {
    pub fn new() -> Self {
        Self
    }
}

fn require(path: PathBuf, label: &str) -> ScaffoldResult<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(ScaffoldError::MissingTemplateAsset {
            label: label.to_string(),
            path,
        })
    }
}

/// True when `path` exists and its contents are not JSON
fn is_usable_tmdl(path: &Path) -> bool {
    read_text(path).is_ok_and(|text| !is_json_like(&text))
}

/// Fill the table placeholders of a model definition
pub fn fill_model_placeholders(text: &str, tables: &[String]) -> String {
    let list = format!(
        "[{}]",
        tables
            .iter()
            .map(|t| format!("'{t}'"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let refs = tables
        .iter()
        .map(|t| format!("ref table {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    text.replace(TABLE_LIST_PLACEHOLDER, &list)
        .replace(TABLE_REF_PLACEHOLDER, &refs)
}

/// Copy `.tmdl` files from `src` to `dst`, skipping JSON-like ones
fn copy_table_files(src: &Path, dst: &Path) -> ScaffoldResult<usize> {
    if !src.is_dir() {
        return Ok(0);
    }
    let mut copied = 0;
    for file in discover_files(src, "*.tmdl", false)? {
        if !is_usable_tmdl(&file) {
            debug!(path = %file.display(), "Skipping JSON-like table file");
            continue;
        }
        if let Some(name) = file.file_name() {
            copy_file(&file, &dst.join(name))?;
            copied += 1;
        }
    }
    Ok(copied)
}

impl Scaffolder for TemplateScaffolder {
    fn scaffold(&self, layout: &ProjectLayout, force: bool) -> ScaffoldResult<ScaffoldSummary> {
        let _span = info_span!("scaffold", base = layout.base()).entered();

        let template = require(layout.template_dir(), "template root")?;
        let base = layout.base();
        let project_dir = layout.project_dir();
        if force {
            remove_dir_all(&project_dir)?;
        }

        let tpl_sem = template.join(TEMPLATE_SEMANTIC_MODEL);
        let tpl_def = tpl_sem.join(DEFINITION_DIR);
        let generated = layout.intermediate_definition_dir();

        let out_sem = layout.semantic_model_dir();
        let out_def = layout.definition_dir();
        let out_tables = out_def.join(TABLES_DIR);
        ensure_dir(&out_tables)?;

        // manifest
        let manifest = require(template.join(TEMPLATE_MANIFEST), TEMPLATE_MANIFEST)?;
        let text = read_text(&manifest)?
            .replace(REPORT_PLACEHOLDER, &format!("{base}.Report"))
            .replace(SEMANTIC_MODEL_PLACEHOLDER, &format!("{base}.SemanticModel"));
        write_atomic(&layout.manifest_path(), &text)?;

        // report folder is copied opaquely
        let report = require(template.join(TEMPLATE_REPORT), TEMPLATE_REPORT)?;
        let report_files = copy_dir_all(&report, &layout.report_dir())?;
        debug!(files = report_files, "Copied report template");

        let culture = require(tpl_def.join("cultures").join("en-US.tmdl"), "en-US.tmdl")?;
        copy_file(&culture, &out_def.join("cultures").join("en-US.tmdl"))?;

        for name in [RELATIONSHIPS_FILE, "database.tmdl"] {
            let generated_file = generated.join(name);
            let src = if is_usable_tmdl(&generated_file) {
                generated_file
            } else {
                require(tpl_def.join(name), name)?
            };
            copy_file(&src, &out_def.join(name))?;
        }

        let mut copied = copy_table_files(&generated.join(TABLES_DIR), &out_tables)?;
        if copied == 0 {
            let tpl_tables = require(tpl_def.join(TABLES_DIR), "template tables folder")?;
            copied = copy_table_files(&tpl_tables, &out_tables)?;
        }
        if copied == 0 {
            return Err(ScaffoldError::NoTables);
        }

        let tables: Vec<String> = discover_files(&out_tables, "*.tmdl", false)?
            .iter()
            .filter_map(|p| p.file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect();

        // the template model is always the base; generated model.tmdl is ignored
        let model = require(tpl_def.join("model.tmdl"), "model.tmdl")?;
        let model_text = fill_model_placeholders(&read_text(&model)?, &tables);
        write_atomic(&out_def.join("model.tmdl"), &model_text)?;

        for name in ["definition.pbism", "diagramLayout.json"] {
            let src = require(tpl_sem.join(name), name)?;
            copy_file(&src, &out_sem.join(name))?;
        }

        info!(
            project = %project_dir.display(),
            tables = tables.len(),
            "PBIP scaffold ready"
        );
        Ok(ScaffoldSummary {
            manifest: layout.manifest_path(),
            report_dir: layout.report_dir(),
            semantic_model_dir: out_sem,
            tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_model_placeholders() {
        let tables = vec!["Orders".to_string(), "People".to_string()];
        let text = "model Model\n  annotation PBI_QueryOrder = @@tablenamelist@@\n\n@@reftable@@\n";
        assert_eq!(
            fill_model_placeholders(text, &tables),
            "model Model\n  annotation PBI_QueryOrder = ['Orders', 'People']\n\nref table Orders\nref table People\n"
        );
    }
}

//! Scaffold command implementation

use std::path::PathBuf;

use clap::Args;

use crate::cli::error::CliError;
use crate::cli::output::{OutputFormat, format_scaffold_summary};
use crate::layout::ProjectLayout;
use crate::scaffold::{Scaffolder, TemplateScaffolder};

#[derive(Debug, Args)]
pub struct ScaffoldArgs {
    /// Project folder holding `pbip_template/` and `OUT_PBIP/`
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Output project name, with or without `.pbip`
    #[arg(long, default_value = "SampleTableau.pbip")]
    pub pbip_name: String,

    /// Remove an existing project folder first
    #[arg(long)]
    pub force: bool,
}

/// Handle the scaffold command
pub fn handle_scaffold(args: &ScaffoldArgs, format: OutputFormat) -> Result<(), CliError> {
    let layout = ProjectLayout::new(&args.project_root, &args.pbip_name);
    let summary = TemplateScaffolder::new().scaffold(&layout, args.force)?;
    println!("{}", format_scaffold_summary(&summary, format)?);
    Ok(())
}

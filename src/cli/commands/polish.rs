//! Polish command implementations

use std::path::PathBuf;

use clap::Args;

use crate::cli::error::CliError;
use crate::cli::output::{OutputFormat, format_pass_report};
use crate::polish::{RelationshipPolisher, TablePolishOptions, TablePolisher};

#[derive(Debug, Args)]
pub struct PolishTablesArgs {
    /// Semantic model `definition` folder
    #[arg(long)]
    pub definition_dir: PathBuf,

    /// Re-indent table files structurally
    #[arg(long)]
    pub reindent: bool,

    /// Collapse `{{`/`}}` left behind by template escaping
    #[arg(long)]
    pub collapse_doubled_braces: bool,
}

#[derive(Debug, Args)]
pub struct PolishRelationshipsArgs {
    /// Semantic model `definition` folder
    #[arg(long)]
    pub definition_dir: PathBuf,

    /// Relationship to keep, as `Table.Column=Table.Column` (repeatable, comma-separated)
    #[arg(long = "keep", value_name = "PAIR")]
    pub keep: Vec<String>,

    /// Drop relationships to `LocalDateTable_*` tables
    #[arg(long)]
    pub drop_local_date_table: bool,
}

/// Handle the polish-tables command
pub fn handle_polish_tables(args: &PolishTablesArgs, format: OutputFormat) -> Result<(), CliError> {
    let options = TablePolishOptions {
        reindent: args.reindent,
        collapse_doubled_braces: args.collapse_doubled_braces,
    };
    let report = TablePolisher::new(&args.definition_dir)
        .with_options(options)
        .run()?;
    println!("{}", format_pass_report(&report, format)?);
    Ok(())
}

/// Handle the polish-relationships command
pub fn handle_polish_relationships(
    args: &PolishRelationshipsArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let report = RelationshipPolisher::new(&args.definition_dir)
        .with_keep_entries(&args.keep)?
        .with_drop_local_date_table(args.drop_local_date_table)
        .run()?;
    println!("{}", format_pass_report(&report, format)?);
    Ok(())
}

//! Integrate and discover-tables command implementations

use std::path::PathBuf;

use clap::Args;

use crate::cli::error::CliError;
use crate::cli::output::{OutputFormat, format_pass_report, format_tables};
use crate::generate::{discover_tables, resolve_tables};
use crate::integrate::{Integrator, TableFragments};
use crate::layout::ProjectLayout;
use crate::models::KeepPair;
use crate::storage::read_text;

#[derive(Debug, Args)]
pub struct IntegrateArgs {
    /// Project folder holding `out/` and `OUT_PBIP/`
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Output project name, with or without `.pbip`
    #[arg(long, default_value = "SampleTableau.pbip")]
    pub pbip_name: String,

    /// Table to integrate (repeatable), or `ALL` to discover them
    #[arg(long = "table", required = true)]
    pub tables: Vec<String>,

    /// Data source description used by `--table ALL`
    #[arg(long, default_value = "datasource_demo_tableau.xml")]
    pub xml: PathBuf,

    /// Columns fragment; only with a single table
    #[arg(long)]
    pub columns_file: Option<PathBuf>,

    /// Partition query fragment; only with a single table
    #[arg(long)]
    pub partition_file: Option<PathBuf>,

    /// Relationship to declare, as `Table.Column=Table.Column` (repeatable)
    #[arg(long = "relationship", value_name = "PAIR")]
    pub relationships: Vec<String>,

    /// `crossFilteringBehavior` for declared relationships
    #[arg(long)]
    pub cross_filtering_behavior: Option<String>,

    /// Keep doubled braces in partition queries as written
    #[arg(long)]
    pub keep_doubled_braces: bool,
}

#[derive(Debug, Args)]
pub struct DiscoverTablesArgs {
    /// Data source description to scan
    #[arg(long)]
    pub xml: PathBuf,
}

fn fragments_for(args: &IntegrateArgs, layout: &ProjectLayout) -> Result<Vec<TableFragments>, CliError> {
    let xml = args.project_root.join(&args.xml);
    let mut tables = Vec::new();
    for selection in &args.tables {
        tables.extend(resolve_tables(selection, &xml)?);
    }

    let explicit = args.columns_file.is_some() || args.partition_file.is_some();
    if explicit && tables.len() != 1 {
        return Err(CliError::InvalidArgument(
            "--columns-file and --partition-file need exactly one --table".to_string(),
        ));
    }

    Ok(tables
        .iter()
        .map(|table| {
            let mut fragments = TableFragments::from_layout(layout, table);
            if let Some(path) = &args.columns_file {
                fragments.columns_file = path.clone();
            }
            if let Some(path) = &args.partition_file {
                fragments.partition_file = path.clone();
            }
            fragments
        })
        .collect())
}

/// Handle the integrate command
pub fn handle_integrate(args: &IntegrateArgs, format: OutputFormat) -> Result<(), CliError> {
    let layout = ProjectLayout::new(&args.project_root, &args.pbip_name);
    let fragments = fragments_for(args, &layout)?;
    let relationships = KeepPair::parse_list(&args.relationships)?;

    let report = Integrator::new(layout.intermediate_definition_dir())
        .with_relationships(relationships)
        .with_cross_filtering_behavior(args.cross_filtering_behavior.clone())
        .with_collapse_doubled_braces(!args.keep_doubled_braces)
        .run(&fragments)?;
    println!("{}", format_pass_report(&report, format)?);
    Ok(())
}

/// Handle the discover-tables command
pub fn handle_discover_tables(
    args: &DiscoverTablesArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let text = read_text(&args.xml)?;
    let tables = discover_tables(&text);
    println!("{}", format_tables(&tables, format)?);
    Ok(())
}

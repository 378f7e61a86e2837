//! CLI command for full pipeline runs

use std::path::PathBuf;

use clap::Args;

use crate::cli::error::CliError;
use crate::cli::output::{OutputFormat, format_pipeline_report};
use crate::pipeline::{
    DEFAULT_CONFIG_FILE, GeneratorConfig, PipelineConfig, PipelineExecutor, PipelineStage,
};

/// Arguments for the `run` command
#[derive(Debug, Args)]
pub struct PipelineRunArgs {
    /// Project folder; inputs and outputs are resolved against it
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Configuration file (default: `<project-root>/pbip-tmdl.toml` when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stage to run by name or 1-based index (repeatable; default: all)
    #[arg(long = "stage", value_name = "STAGE")]
    pub stages: Vec<String>,

    /// Output project name, with or without `.pbip`
    #[arg(long)]
    pub pbip_name: Option<String>,

    /// Comma-separated tables, or `ALL`
    #[arg(long)]
    pub tables: Option<String>,

    /// Generator program run once per table
    #[arg(long)]
    pub generator: Option<String>,

    /// Relationship to keep, as `Table.Column=Table.Column` (repeatable)
    #[arg(long = "keep", value_name = "PAIR")]
    pub keep: Vec<String>,

    /// Drop relationships to `LocalDateTable_*` tables
    #[arg(long)]
    pub drop_local_date_table: bool,

    /// Recreate the output project from scratch
    #[arg(long)]
    pub force: bool,

    /// Validate inputs without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

fn load_config(args: &PipelineRunArgs) -> Result<PipelineConfig, CliError> {
    let explicit = args.config.is_some();
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| args.project_root.join(DEFAULT_CONFIG_FILE));

    let mut config = if explicit || path.exists() {
        PipelineConfig::load(&path)?
    } else {
        PipelineConfig::new()
    };
    config.project_root = args.project_root.clone();
    Ok(config)
}

/// Handle the `run` command
pub fn handle_pipeline_run(
    args: &PipelineRunArgs,
    verbose: bool,
    format: OutputFormat,
) -> Result<(), CliError> {
    let stages: Vec<PipelineStage> = args
        .stages
        .iter()
        .map(|s| s.parse::<PipelineStage>().map_err(CliError::InvalidArgument))
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = load_config(args)?
        .with_dry_run(args.dry_run)
        .with_verbose(verbose);

    if !stages.is_empty() {
        config = config.with_stages(stages);
    }
    if let Some(name) = &args.pbip_name {
        config = config.with_pbip_name(name);
    }
    if let Some(tables) = &args.tables {
        config = config.with_tables(tables);
    }
    if let Some(program) = &args.generator {
        let generator = GeneratorConfig {
            program: Some(program.clone()),
            ..config.generator.clone()
        };
        config = config.with_generator(generator);
    }
    if !args.keep.is_empty() {
        config = config.with_keep(args.keep.clone());
    }
    if args.drop_local_date_table {
        config = config.with_drop_local_date_table(true);
    }
    if args.force {
        config = config.with_force(true);
    }

    let mut executor = PipelineExecutor::new(config)?;
    eprintln!("Starting pipeline run: {}", executor.run_id());

    let report = executor.run()?;
    if verbose {
        report.print_summary();
    }
    println!("{}", format_pipeline_report(&report, format)?);

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::PipelineError("Pipeline failed".to_string()))
    }
}

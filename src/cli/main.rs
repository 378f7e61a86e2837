//! pbip-tmdl command-line interface
//!
//! ```bash
//! # Rewrite brace blocks into label style
//! pbip-tmdl normalize --root OUT_PBIP/Sales/Sales.SemanticModel
//!
//! # Keep a single relationship and drop date-table links
//! pbip-tmdl polish-relationships --definition-dir definition \
//!     --keep Orders.Region=People.Region --drop-local-date-table
//!
//! # Run every stage for a project folder
//! pbip-tmdl run --project-root . --pbip-name Sales.pbip
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use pbip_tmdl::cli::commands::{
    integrate::{DiscoverTablesArgs, IntegrateArgs, handle_discover_tables, handle_integrate},
    normalize::{NormalizeArgs, handle_normalize},
    pipeline::{PipelineRunArgs, handle_pipeline_run},
    polish::{
        PolishRelationshipsArgs, PolishTablesArgs, handle_polish_relationships,
        handle_polish_tables,
    },
    scaffold::{ScaffoldArgs, handle_scaffold},
};
use pbip_tmdl::cli::{CliError, OutputFormat};

#[derive(Parser)]
#[command(
    name = "pbip-tmdl",
    version = env!("CARGO_PKG_VERSION"),
    about = "Generate, scaffold and polish TMDL for Power BI projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Result format on stdout
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite `name = { ... }` blocks into label style
    Normalize(NormalizeArgs),

    /// Repair partition expressions and drop stray labels in table files
    PolishTables(PolishTablesArgs),

    /// Filter relationships against an allow-list
    PolishRelationships(PolishRelationshipsArgs),

    /// Assemble generated fragments into table definitions
    Integrate(IntegrateArgs),

    /// Materialize the PBIP project from the template
    Scaffold(ScaffoldArgs),

    /// List the tables referenced by a data source description
    DiscoverTables(DiscoverTablesArgs),

    /// Run the full pipeline
    Run(PipelineRunArgs),
}

fn setup_logging(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install log subscriber")
}

fn dispatch(cli: &Cli) -> Result<(), CliError> {
    let format = cli.format;
    match &cli.command {
        Commands::Normalize(args) => handle_normalize(args, format),
        Commands::PolishTables(args) => handle_polish_tables(args, format),
        Commands::PolishRelationships(args) => handle_polish_relationships(args, format),
        Commands::Integrate(args) => handle_integrate(args, format),
        Commands::Scaffold(args) => handle_scaffold(args, format),
        Commands::DiscoverTables(args) => handle_discover_tables(args, format),
        Commands::Run(args) => handle_pipeline_run(args, cli.verbose > 0, format),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.verbose, cli.quiet) {
        eprintln!("Warning: {e:#}");
    }

    if let Err(e) = dispatch(&cli) {
        error!("{}", e);
        debug!(?e, "detailed error context");
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }
}

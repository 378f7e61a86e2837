//! Normalize command implementation

use std::path::PathBuf;

use clap::Args;

use crate::cli::error::CliError;
use crate::cli::output::{OutputFormat, format_pass_report};
use crate::normalize::Normalizer;

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Folder scanned recursively for .tmdl files
    #[arg(long)]
    pub root: PathBuf,
}

/// Handle the normalize command
pub fn handle_normalize(args: &NormalizeArgs, format: OutputFormat) -> Result<(), CliError> {
    if !args.root.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "Not a directory: {}",
            args.root.display()
        )));
    }

    let report = Normalizer::new(&args.root).run()?;
    println!("{}", format_pass_report(&report, format)?);
    Ok(())
}

//! Full pipeline from fragment generation to a polished PBIP project
//!
//! The executor runs these stages in order:
//!
//! 1. **Generate** (optional): Run the external generator once per table
//! 2. **Integrate**: Assemble fragments into table definitions
//! 3. **Scaffold**: Materialize `OUT_PBIP/<Base>` from the template
//! 4. **Normalize**: Rewrite brace blocks into label style
//! 5. **Polish tables**: Repair expressions and drop stray labels
//! 6. **Polish relationships**: Filter relationships against the allow-list
//!
//! # Example
//!
//! ```rust,no_run
//! use pbip_tmdl::pipeline::{PipelineConfig, PipelineExecutor, PipelineStage};
//!
//! let config = PipelineConfig::new()
//!     .with_project_root("/work/sales")
//!     .with_pbip_name("Sales.pbip")
//!     .with_keep(vec!["Orders.Region=People.Region".to_string()])
//!     .with_stages(vec![
//!         PipelineStage::Scaffold,
//!         PipelineStage::Normalize,
//!         PipelineStage::PolishTables,
//!         PipelineStage::PolishRelationships,
//!     ]);
//!
//! let mut executor = PipelineExecutor::new(config)?;
//! let report = executor.run()?;
//!
//! println!("Pipeline completed in {}", report.duration_formatted());
//! # Ok::<(), pbip_tmdl::pipeline::PipelineError>(())
//! ```
//!
//! # Dry Run
//!
//! With `with_dry_run(true)` every selected stage checks its inputs and
//! nothing is written.

mod config;
mod error;
mod executor;
mod output;

pub use config::{DEFAULT_CONFIG_FILE, GeneratorConfig, PipelineConfig, PipelineStage};
pub use error::{PipelineError, PipelineResult};
pub use executor::{PipelineExecutor, PipelineReport};
pub use output::{PipelineStatus, StageOutput};

/// Run a pipeline with the given configuration
pub fn run_pipeline(config: PipelineConfig) -> PipelineResult<PipelineReport> {
    let mut executor = PipelineExecutor::new(config)?;
    executor.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_pipeline_dry_run() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("pbip_template")).unwrap();

        let config = PipelineConfig::new()
            .with_project_root(temp.path())
            .with_dry_run(true)
            .with_stages(vec![PipelineStage::Scaffold, PipelineStage::Normalize]);

        let report = run_pipeline(config).unwrap();
        assert!(report.is_success());
        assert!(report.stages_completed.is_empty());
        assert!(!temp.path().join("OUT_PBIP").exists());
    }
}

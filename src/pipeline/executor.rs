//! Pipeline executor for running the post-processing stages

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use super::config::{PipelineConfig, PipelineStage};
use super::error::{PipelineError, PipelineResult};
use super::output::{PipelineStatus, StageOutput};
use crate::env::EnvFile;
use crate::generate::{CommandGenerator, GenerateRequest, Generator, resolve_tables};
use crate::integrate::{Integrator, TableFragments};
use crate::layout::ProjectLayout;
use crate::normalize::Normalizer;
use crate::polish::{RELATIONSHIPS_FILE, RelationshipPolisher, TablePolisher};
use crate::scaffold::{Scaffolder, TemplateScaffolder};

/// Pipeline executor that runs all stages
pub struct PipelineExecutor {
    config: PipelineConfig,
    layout: ProjectLayout,
    run_id: String,
    generator: Option<Box<dyn Generator>>,
    scaffolder: Box<dyn Scaffolder>,
    status: PipelineStatus,
    completed: Vec<PipelineStage>,
    outputs: BTreeMap<String, StageOutput>,
}

impl PipelineExecutor {
    /// Create a new pipeline executor
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::ConfigError)?;

        let layout = config.layout();
        Ok(Self {
            config,
            layout,
            run_id: Uuid::new_v4().to_string(),
            generator: None,
            scaffolder: Box::new(TemplateScaffolder::new()),
            status: PipelineStatus::Running,
            completed: Vec::new(),
            outputs: BTreeMap::new(),
        })
    }

    /// Use `generator` instead of the configured command
    pub fn with_generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use `scaffolder` instead of the template scaffolder
    pub fn with_scaffolder(mut self, scaffolder: Box<dyn Scaffolder>) -> Self {
        self.scaffolder = scaffolder;
        self
    }

    /// Unique id of this run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Run the pipeline
    pub fn run(&mut self) -> PipelineResult<PipelineReport> {
        let _span = info_span!(
            "pipeline_run",
            run_id = %self.run_id,
            dry_run = self.config.dry_run
        )
        .entered();

        let start = Instant::now();
        let stages = self.config.effective_stages();

        info!(
            run_id = %self.run_id,
            project = %self.layout.project_dir().display(),
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            dry_run = self.config.dry_run,
            "Starting pipeline"
        );

        if self.config.verbose {
            eprintln!("Pipeline run: {}", self.run_id);
            eprintln!(
                "Stages to run: {:?}",
                stages.iter().map(|s| s.name()).collect::<Vec<_>>()
            );
            if self.config.dry_run {
                eprintln!("DRY RUN MODE - no changes will be made");
            }
        }

        if self.config.dry_run {
            return self.dry_run(&stages);
        }

        for stage in &stages {
            if let Some(reason) = self.should_skip_stage(*stage) {
                debug!(stage = stage.name(), reason = %reason, "Skipping stage");
                if self.config.verbose {
                    eprintln!("Skipping stage {}: {}", stage.name(), reason);
                }
                self.outputs
                    .insert(stage.name().to_string(), StageOutput::skipped(reason));
                continue;
            }

            let _stage_span = info_span!("pipeline_stage", stage = stage.name()).entered();
            info!(stage = stage.name(), "Starting stage");

            match self.run_stage(*stage) {
                Ok(output) => {
                    info!(
                        stage = stage.name(),
                        duration_ms = output.duration_ms,
                        files = output.files.len(),
                        "Stage completed"
                    );
                    if self.config.verbose {
                        eprintln!(
                            "Stage {} completed in {}ms",
                            stage.name(),
                            output.duration_ms
                        );
                    }
                    self.completed.push(*stage);
                    self.outputs.insert(stage.name().to_string(), output);
                }
                Err(e) => {
                    error!(stage = stage.name(), error = %e, "Stage failed");
                    self.status = PipelineStatus::Failed;
                    return Err(e);
                }
            }
        }

        self.status = PipelineStatus::Completed;
        let duration = start.elapsed();
        info!(
            run_id = %self.run_id,
            duration_ms = duration.as_millis() as u64,
            stages_completed = self.completed.len(),
            "Pipeline completed"
        );

        Ok(PipelineReport {
            run_id: self.run_id.clone(),
            status: self.status,
            stages_completed: self.completed.clone(),
            duration_ms: duration.as_millis() as u64,
            outputs: self.outputs.clone(),
        })
    }

    /// Run a single stage
    fn run_stage(&self, stage: PipelineStage) -> PipelineResult<StageOutput> {
        let start = Instant::now();

        let output = match stage {
            PipelineStage::Generate => self.run_generate()?,
            PipelineStage::Integrate => self.run_integrate()?,
            PipelineStage::Scaffold => self.run_scaffold()?,
            PipelineStage::Normalize => self.run_normalize()?,
            PipelineStage::PolishTables => self.run_polish_tables()?,
            PipelineStage::PolishRelationships => self.run_polish_relationships()?,
        };

        Ok(output.with_duration(start.elapsed().as_millis() as u64))
    }

    fn tables(&self, stage: PipelineStage) -> PipelineResult<Vec<String>> {
        resolve_tables(&self.config.tables, &self.config.xml_path())
            .map_err(|e| PipelineError::stage_failure(stage.name(), e))
    }

    fn command_generator(&self) -> PipelineResult<CommandGenerator> {
        let settings = &self.config.generator;
        let program = settings
            .program
            .clone()
            .ok_or_else(|| PipelineError::MissingInput("generator program".to_string()))?;
        let env = EnvFile::load_optional(&self.config.env_path())
            .map_err(|e| PipelineError::stage_failure(PipelineStage::Generate.name(), e))?;

        Ok(CommandGenerator::new(program)
            .with_leading_args(settings.args.clone())
            .with_provider(&settings.provider)
            .with_model(&settings.model)
            .with_env(env))
    }

    /// Run the generate stage
    fn run_generate(&self) -> PipelineResult<StageOutput> {
        let stage = PipelineStage::Generate;
        let tables = self.tables(stage)?;
        let out_dir = self.layout.fragments_dir();
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| PipelineError::io_with_path(&out_dir, "creating fragments folder", e))?;

        let fallback;
        let generator: &dyn Generator = match &self.generator {
            Some(generator) => generator.as_ref(),
            None => {
                fallback = self.command_generator()?;
                &fallback
            }
        };

        let mut output = StageOutput::success();
        for table in &tables {
            debug!(table = %table, "Generating fragments");
            let request = GenerateRequest {
                input_xml: self.config.xml_path(),
                out_dir: out_dir.clone(),
                prompt_file: self.config.prompt_path(),
                table: table.clone(),
            };
            generator
                .generate(&request)
                .map_err(|e| PipelineError::stage_failure(stage.name(), e))?;
            output = output
                .with_file(self.layout.columns_fragment(table))
                .with_file(self.layout.partition_fragment(table));
        }

        Ok(output.with_metadata("tables", serde_json::json!(tables)))
    }

    /// Run the integrate stage
    fn run_integrate(&self) -> PipelineResult<StageOutput> {
        let stage = PipelineStage::Integrate;
        let tables = self.tables(stage)?;
        let fragments: Vec<TableFragments> = tables
            .iter()
            .map(|table| TableFragments::from_layout(&self.layout, table))
            .collect();

        let report = Integrator::new(self.layout.intermediate_definition_dir())
            .with_relationships(self.config.declared_relationships()?)
            .with_cross_filtering_behavior(self.config.cross_filtering_behavior.clone())
            .run(&fragments)
            .map_err(|e| PipelineError::stage_failure(stage.name(), e))?;

        Ok(StageOutput::from_pass(&report)?.with_metadata("tables", serde_json::json!(tables)))
    }

    /// Run the scaffold stage
    fn run_scaffold(&self) -> PipelineResult<StageOutput> {
        let summary = self
            .scaffolder
            .scaffold(&self.layout, self.config.force)
            .map_err(|e| PipelineError::stage_failure(PipelineStage::Scaffold.name(), e))?;

        Ok(StageOutput::success()
            .with_file(&summary.manifest)
            .with_file(&summary.report_dir)
            .with_file(&summary.semantic_model_dir)
            .with_metadata("tables", serde_json::json!(summary.tables)))
    }

    /// Run the normalize stage
    fn run_normalize(&self) -> PipelineResult<StageOutput> {
        let report = Normalizer::new(self.layout.semantic_model_dir())
            .run()
            .map_err(|e| PipelineError::stage_failure(PipelineStage::Normalize.name(), e))?;
        Ok(StageOutput::from_pass(&report)?)
    }

    /// Run the table polishing stage
    fn run_polish_tables(&self) -> PipelineResult<StageOutput> {
        let report = TablePolisher::new(self.layout.definition_dir())
            .with_options(self.config.table_polish)
            .run()
            .map_err(|e| PipelineError::stage_failure(PipelineStage::PolishTables.name(), e))?;
        Ok(StageOutput::from_pass(&report)?)
    }

    /// Run the relationship polishing stage
    fn run_polish_relationships(&self) -> PipelineResult<StageOutput> {
        let report = RelationshipPolisher::new(self.layout.definition_dir())
            .with_keep(self.config.keep_pairs()?)
            .with_drop_local_date_table(self.config.drop_local_date_table)
            .run()
            .map_err(|e| {
                PipelineError::stage_failure(PipelineStage::PolishRelationships.name(), e)
            })?;
        Ok(StageOutput::from_pass(&report)?)
    }

    /// Check if a stage should be skipped
    fn should_skip_stage(&self, stage: PipelineStage) -> Option<String> {
        match stage {
            PipelineStage::Generate
                if self.generator.is_none() && !self.config.generator.is_enabled() =>
            {
                Some("No generator configured".to_string())
            }
            _ => None,
        }
    }

    /// Run in dry-run mode (validation only)
    fn dry_run(&self, stages: &[PipelineStage]) -> PipelineResult<PipelineReport> {
        let mut validation_errors = Vec::new();

        for stage in stages {
            if self.should_skip_stage(*stage).is_some() {
                continue;
            }
            if let Err(e) = self.validate_stage(*stage) {
                validation_errors.push(format!("{}: {}", stage.name(), e));
            }
        }

        if !validation_errors.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "Validation errors:\n  {}",
                validation_errors.join("\n  ")
            )));
        }

        info!("Dry run validation passed for all stages");

        Ok(PipelineReport {
            run_id: self.run_id.clone(),
            status: PipelineStatus::Completed,
            stages_completed: Vec::new(),
            duration_ms: 0,
            outputs: BTreeMap::new(),
        })
    }

    /// Whether an earlier stage in this run will produce the stage's inputs
    fn produced_earlier(&self, producer: PipelineStage) -> bool {
        self.config.should_run_stage(producer) && self.should_skip_stage(producer).is_none()
    }

    /// Validate a stage's inputs
    fn validate_stage(&self, stage: PipelineStage) -> PipelineResult<()> {
        let require = |path: &Path| {
            if path.exists() {
                Ok(())
            } else {
                Err(PipelineError::FileNotFound(path.to_path_buf()))
            }
        };

        match stage {
            PipelineStage::Generate => {
                require(&self.config.xml_path())?;
                require(&self.config.prompt_path())?;
            }
            PipelineStage::Integrate => {
                if !self.produced_earlier(PipelineStage::Generate) {
                    for table in self.tables(stage)? {
                        require(&self.layout.columns_fragment(&table))?;
                        require(&self.layout.partition_fragment(&table))?;
                    }
                }
            }
            PipelineStage::Scaffold => {
                require(&self.layout.template_dir())?;
            }
            PipelineStage::Normalize | PipelineStage::PolishTables => {
                if !self.produced_earlier(PipelineStage::Scaffold) {
                    require(&self.layout.definition_dir())?;
                }
            }
            PipelineStage::PolishRelationships => {
                self.config.keep_pairs()?;
                if !self.produced_earlier(PipelineStage::Scaffold) {
                    require(&self.layout.definition_dir().join(RELATIONSHIPS_FILE))?;
                }
            }
        }
        Ok(())
    }
}

/// Report from a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Run ID
    pub run_id: String,
    /// Final status
    pub status: PipelineStatus,
    /// Completed stages
    pub stages_completed: Vec<PipelineStage>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Stage outputs, skipped stages included
    pub outputs: BTreeMap<String, StageOutput>,
}

impl PipelineReport {
    /// Check if pipeline was successful
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    /// Get formatted duration
    pub fn duration_formatted(&self) -> String {
        let secs = self.duration_ms / 1000;
        let mins = secs / 60;
        let remaining_secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, remaining_secs)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", self.duration_ms)
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Pipeline {} - {}", self.run_id, self.status);
        eprintln!("Duration: {}", self.duration_formatted());
        eprintln!("Stages completed: {}", self.stages_completed.len());

        for stage in PipelineStage::all() {
            if let Some(output) = self.outputs.get(stage.name()) {
                let status = if output.skipped {
                    "skipped"
                } else if output.success {
                    "ok"
                } else {
                    "failed"
                };
                eprintln!(
                    "  - {}: {} ({}ms, {} file(s))",
                    stage.name(),
                    status,
                    output.duration_ms,
                    output.files.len()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pipeline_executor_creation() {
        let config = PipelineConfig::new().with_pbip_name("Sales");
        let executor = PipelineExecutor::new(config).unwrap();
        assert_eq!(executor.layout().base(), "Sales");
        assert_eq!(executor.run_id().len(), 36);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::new().with_keep(vec!["nonsense".to_string()]);
        let err = PipelineExecutor::new(config).err().unwrap();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn test_generate_skipped_without_program() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::new()
            .with_project_root(temp.path())
            .with_stages(vec![PipelineStage::Generate]);
        let report = PipelineExecutor::new(config).unwrap().run().unwrap();
        assert!(report.is_success());
        assert!(report.stages_completed.is_empty());
        assert!(report.outputs["generate"].skipped);
    }

    #[test]
    fn test_dry_run_reports_missing_inputs() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::new()
            .with_project_root(temp.path())
            .with_stages(vec![PipelineStage::Normalize, PipelineStage::PolishRelationships])
            .with_dry_run(true);
        let err = PipelineExecutor::new(config).unwrap().run().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("normalize"));
        assert!(msg.contains("polish-relationships"));
    }

    #[test]
    fn test_pipeline_report() {
        let report = PipelineReport {
            run_id: "test-123".to_string(),
            status: PipelineStatus::Completed,
            stages_completed: vec![PipelineStage::Normalize, PipelineStage::PolishTables],
            duration_ms: 65000,
            outputs: BTreeMap::new(),
        };

        assert!(report.is_success());
        assert_eq!(report.duration_formatted(), "1m 5s");
    }
}

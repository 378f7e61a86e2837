//! Pipeline configuration types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use crate::generate::ALL_TABLES;
use crate::layout::ProjectLayout;
use crate::models::KeepPair;
use crate::polish::TablePolishOptions;

/// Default configuration file name in the project root
pub const DEFAULT_CONFIG_FILE: &str = "pbip-tmdl.toml";

/// Main pipeline configuration
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// pbip_name = "SampleTableau.pbip"
/// tables = "Orders,People,Returned"
/// keep = ["Orders.Region=People.Region"]
/// drop_local_date_table = true
///
/// [generator]
/// program = "python3"
/// args = ["tableau_xml_to_bossstyle_ai.py"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Folder holding the inputs, the template and `OUT_PBIP/`
    pub project_root: PathBuf,
    /// Output project name, with or without `.pbip`
    pub pbip_name: String,
    /// Comma-separated table names, or `ALL` to discover them
    pub tables: String,
    /// Data source description, relative to the project root
    pub xml_file: PathBuf,
    /// Prompt handed to the generator, relative to the project root
    pub prompt_file: PathBuf,
    /// Env file whose values are passed to the generator
    pub env_file: PathBuf,
    /// External fragment generator
    pub generator: GeneratorConfig,
    /// Relationships declared during integration
    pub relationships: Vec<String>,
    /// `crossFilteringBehavior` written on declared relationships
    pub cross_filtering_behavior: Option<String>,
    /// Relationship allow-list for the relationship polisher
    pub keep: Vec<String>,
    /// Drop `LocalDateTable_*` relationships
    pub drop_local_date_table: bool,
    /// Opt-in table polishing rewrites
    pub table_polish: TablePolishOptions,
    /// Recreate `OUT_PBIP/<Base>` from scratch when scaffolding
    pub force: bool,
    /// Stages to run (empty = all)
    pub stages: Vec<PipelineStage>,
    /// Enable dry-run mode
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            pbip_name: "SampleTableau.pbip".to_string(),
            tables: ALL_TABLES.to_string(),
            xml_file: PathBuf::from("datasource_demo_tableau.xml"),
            prompt_file: PathBuf::from("prompt.txt"),
            env_file: PathBuf::from(crate::env::DEFAULT_ENV_FILE),
            generator: GeneratorConfig::default(),
            relationships: Vec::new(),
            cross_filtering_behavior: None,
            keep: Vec::new(),
            drop_local_date_table: false,
            table_polish: TablePolishOptions::default(),
            force: false,
            stages: Vec::new(),
            dry_run: false,
            verbose: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline config
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        toml::from_str(text).map_err(|e| PipelineError::ConfigError(e.to_string()))
    }

    /// Load a TOML configuration file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io_with_path(path, "reading config", e))?;
        Self::from_toml_str(&text)
    }

    /// Set the project root
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = path.into();
        self
    }

    /// Set the output project name
    pub fn with_pbip_name(mut self, name: impl Into<String>) -> Self {
        self.pbip_name = name.into();
        self
    }

    /// Set the table selection
    pub fn with_tables(mut self, tables: impl Into<String>) -> Self {
        self.tables = tables.into();
        self
    }

    /// Set the generator
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    /// Set relationships to declare during integration
    pub fn with_relationships(mut self, relationships: Vec<String>) -> Self {
        self.relationships = relationships;
        self
    }

    /// Set the relationship allow-list
    pub fn with_keep(mut self, keep: Vec<String>) -> Self {
        self.keep = keep;
        self
    }

    /// Drop auto date/time relationships
    pub fn with_drop_local_date_table(mut self, drop: bool) -> Self {
        self.drop_local_date_table = drop;
        self
    }

    /// Set table polishing options
    pub fn with_table_polish(mut self, options: TablePolishOptions) -> Self {
        self.table_polish = options;
        self
    }

    /// Recreate the output project when scaffolding
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set specific stages to run
    pub fn with_stages(mut self, stages: Vec<PipelineStage>) -> Self {
        self.stages = stages;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Project paths derived from the root and project name
    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project_root, &self.pbip_name)
    }

    pub fn xml_path(&self) -> PathBuf {
        self.project_root.join(&self.xml_file)
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.project_root.join(&self.prompt_file)
    }

    pub fn env_path(&self) -> PathBuf {
        self.project_root.join(&self.env_file)
    }

    /// Parsed relationship allow-list
    pub fn keep_pairs(&self) -> PipelineResult<Vec<KeepPair>> {
        KeepPair::parse_list(&self.keep).map_err(|e| PipelineError::ConfigError(e.to_string()))
    }

    /// Parsed relationships to declare
    pub fn declared_relationships(&self) -> PipelineResult<Vec<KeepPair>> {
        KeepPair::parse_list(&self.relationships)
            .map_err(|e| PipelineError::ConfigError(e.to_string()))
    }

    /// Get stages to run (all if empty), always in pipeline order
    pub fn effective_stages(&self) -> Vec<PipelineStage> {
        PipelineStage::all()
            .into_iter()
            .filter(|stage| self.should_run_stage(*stage))
            .collect()
    }

    /// Check if a specific stage should run
    pub fn should_run_stage(&self, stage: PipelineStage) -> bool {
        if self.stages.is_empty() {
            true
        } else {
            self.stages.contains(&stage)
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if crate::layout::base_name(self.pbip_name.trim()).is_empty() {
            return Err("Project name must not be empty".to_string());
        }

        if self.tables.trim().is_empty() {
            return Err("Table selection must not be empty".to_string());
        }

        KeepPair::parse_list(&self.keep).map_err(|e| e.to_string())?;
        KeepPair::parse_list(&self.relationships).map_err(|e| e.to_string())?;

        Ok(())
    }
}

/// External generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program to run per table; the generate stage is skipped when unset
    pub program: Option<String>,
    /// Arguments placed before the generated ones
    pub args: Vec<String>,
    /// Model provider name passed through to the program
    pub provider: String,
    /// Model or deployment name passed through to the program
    pub model: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            provider: "azure".to_string(),
            model: "gpt-5-mini".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Check if a generator program is configured
    pub fn is_enabled(&self) -> bool {
        self.program.is_some()
    }

    /// Create a config running `program`
    pub fn command(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
            ..Default::default()
        }
    }
}

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    /// Stage 1: Generate per-table fragments with the external generator
    Generate,
    /// Stage 2: Integrate fragments into table definitions
    Integrate,
    /// Stage 3: Scaffold the PBIP project from the template
    Scaffold,
    /// Stage 4: Rewrite brace blocks into label style
    Normalize,
    /// Stage 5: Polish table definitions
    PolishTables,
    /// Stage 6: Filter relationships
    PolishRelationships,
}

impl PipelineStage {
    /// Get all stages in execution order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Generate,
            Self::Integrate,
            Self::Scaffold,
            Self::Normalize,
            Self::PolishTables,
            Self::PolishRelationships,
        ]
    }

    /// Get stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Integrate => "integrate",
            Self::Scaffold => "scaffold",
            Self::Normalize => "normalize",
            Self::PolishTables => "polish-tables",
            Self::PolishRelationships => "polish-relationships",
        }
    }

    /// Get stage description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Generate => "Generate column and partition fragments",
            Self::Integrate => "Integrate fragments into table definitions",
            Self::Scaffold => "Scaffold the PBIP project from the template",
            Self::Normalize => "Convert brace blocks to label style",
            Self::PolishTables => "Polish table definitions",
            Self::PolishRelationships => "Filter relationships",
        }
    }

    /// Get stage index (1-based)
    pub fn index(&self) -> usize {
        match self {
            Self::Generate => 1,
            Self::Integrate => 2,
            Self::Scaffold => 3,
            Self::Normalize => 4,
            Self::PolishTables => 5,
            Self::PolishRelationships => 6,
        }
    }

    /// Check if this stage is optional
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Generate)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "generate" | "1" => Ok(Self::Generate),
            "integrate" | "2" => Ok(Self::Integrate),
            "scaffold" | "3" => Ok(Self::Scaffold),
            "normalize" | "4" => Ok(Self::Normalize),
            "polish-tables" | "5" => Ok(Self::PolishTables),
            "polish-relationships" | "6" => Ok(Self::PolishRelationships),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.tables, "ALL");
        assert_eq!(config.layout().base(), "SampleTableau");
        assert!(!config.generator.is_enabled());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new()
            .with_project_root("/work/project")
            .with_pbip_name("Sales")
            .with_keep(vec!["Orders.Region=People.Region".to_string()])
            .with_dry_run(true);

        assert_eq!(config.xml_path(), PathBuf::from("/work/project/datasource_demo_tableau.xml"));
        assert_eq!(config.keep_pairs().unwrap().len(), 1);
        assert!(config.dry_run);
    }

    #[test]
    fn test_effective_stages_keep_pipeline_order() {
        let config = PipelineConfig::default();
        assert_eq!(config.effective_stages().len(), 6);

        let config = PipelineConfig::default().with_stages(vec![
            PipelineStage::PolishRelationships,
            PipelineStage::Normalize,
        ]);
        assert_eq!(
            config.effective_stages(),
            vec![PipelineStage::Normalize, PipelineStage::PolishRelationships]
        );
    }

    #[test]
    fn test_pipeline_stage_parse() {
        assert_eq!(
            "normalize".parse::<PipelineStage>().unwrap(),
            PipelineStage::Normalize
        );
        assert_eq!("1".parse::<PipelineStage>().unwrap(), PipelineStage::Generate);
        assert_eq!(
            "polish_tables".parse::<PipelineStage>().unwrap(),
            PipelineStage::PolishTables
        );
        assert!("invalid".parse::<PipelineStage>().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = PipelineConfig::from_toml_str(
            r#"
pbip_name = "Sales.pbip"
keep = ["Orders.Region=People.Region"]
drop_local_date_table = true
stages = ["normalize", "polish-tables"]

[table_polish]
reindent = true

[generator]
program = "python3"
args = ["gen.py"]
"#,
        )
        .unwrap();
        assert_eq!(config.layout().base(), "Sales");
        assert!(config.drop_local_date_table);
        assert!(config.table_polish.reindent);
        assert!(!config.table_polish.collapse_doubled_braces);
        assert_eq!(config.generator.program.as_deref(), Some("python3"));
        assert_eq!(config.generator.model, "gpt-5-mini");
        assert_eq!(config.stages, vec![PipelineStage::Normalize, PipelineStage::PolishTables]);

        assert!(PipelineConfig::from_toml_str("stages = [\"bogus\"]").is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());

        let config = PipelineConfig::default().with_keep(vec!["Orders.Region".to_string()]);
        assert!(config.validate().is_err());

        let config = PipelineConfig::default().with_pbip_name(".pbip");
        assert!(config.validate().is_err());
    }
}

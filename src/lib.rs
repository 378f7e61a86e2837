//! pbip-tmdl - TMDL post-processing for Tableau to Power BI Project migrations
//!
//! Provides:
//! - A normalizer rewriting brace-style blocks into label-style TMDL
//! - A table polisher repairing partition expressions and stray labels
//! - A relationship polisher filtering relationships against an allow-list
//! - Fragment generation, integration and project scaffolding stages
//! - A pipeline executor running all of the above in order

pub mod env;
pub mod error;
pub mod generate;
pub mod integrate;
pub mod layout;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod polish;
pub mod report;
pub mod scaffold;
pub mod storage;
pub mod tmdl;

pub mod cli;

pub use env::EnvFile;
pub use error::{TmdlError, TmdlResult};
pub use generate::{CommandGenerator, GenerateError, GenerateRequest, Generator};
pub use integrate::{Integrator, TableFragments};
pub use layout::ProjectLayout;
pub use models::{ColumnSpec, DataType, Endpoint, KeepPair, Relationship, RelationshipsFile};
pub use normalize::Normalizer;
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineExecutor, PipelineReport, PipelineStage, run_pipeline,
};
pub use polish::{RelationshipPolisher, TablePolishOptions, TablePolisher};
pub use report::PassReport;
pub use scaffold::{ScaffoldError, Scaffolder, TemplateScaffolder};

//! CLI error types

use thiserror::Error;

use crate::error::TmdlError;
use crate::generate::GenerateError;
use crate::pipeline::PipelineError;
use crate::scaffold::ScaffoldError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Tmdl(#[from] TmdlError),

    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Output error: {0}")]
    OutputError(String),
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        CliError::PipelineError(err.user_message())
    }
}

impl CliError {
    /// Message printed before exiting with status 1
    pub fn user_message(&self) -> String {
        match self {
            CliError::Tmdl(err) => err.user_message(),
            CliError::Scaffold(ScaffoldError::Storage(err))
            | CliError::Generate(GenerateError::Storage(err)) => err.user_message(),
            CliError::PipelineError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_user_message_uses_pass_hint() {
        let err = CliError::from(TmdlError::UnbalancedExpression {
            path: PathBuf::from("definition/tables/Orders.tmdl"),
            line: 7,
            opens: 3,
            closes: 0,
        });
        let msg = err.user_message();
        assert!(msg.contains("Orders.tmdl at line 7"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_pipeline_error_conversion() {
        let err = CliError::from(PipelineError::MissingInput("prompt.txt".to_string()));
        assert!(matches!(err, CliError::PipelineError(ref m) if m.contains("Hint:")));
    }
}

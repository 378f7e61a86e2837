//! Error types for pipeline operations
//!
//! Stage errors keep their source so the CLI can print the hint of the
//! underlying pass error.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::TmdlError;

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Stage execution failed with context
    #[error("Stage '{stage}' failed: {message}")]
    StageError { stage: String, message: String },

    /// Stage failed with underlying cause
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Missing required input
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// IO error with path context
    #[error("IO error with {}: {message}", path.display())]
    IoErrorWithPath {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create a stage error with message
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageError {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a stage failure with underlying error
    pub fn stage_failure<E>(stage: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StageFailure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Create an IO error with path context
    pub fn io_with_path(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::IoErrorWithPath {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Get the stage name if this is a stage error
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::StageError { stage, .. } => Some(stage),
            PipelineError::StageFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// The pass error behind a stage failure, if any
    pub fn tmdl_error(&self) -> Option<&TmdlError> {
        match self {
            PipelineError::StageFailure { source, .. } => source.downcast_ref::<TmdlError>(),
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!(
                    "Configuration error: {msg}\n\nHint: Check your pipeline configuration file."
                )
            }
            PipelineError::StageError { stage, message } => {
                format!("Stage '{stage}' failed: {message}")
            }
            PipelineError::StageFailure { stage, source } => match self.tmdl_error() {
                Some(err) => format!("Stage '{stage}' failed: {}", err.user_message()),
                None => format!("Stage '{stage}' failed: {source}"),
            },
            PipelineError::MissingInput(input) => {
                format!(
                    "Missing required input: {input}\n\nHint: Ensure all required files exist and paths are correct."
                )
            }
            PipelineError::FileNotFound(path) => {
                format!(
                    "File not found: {}\n\nHint: Check that the file exists and the path is correct.",
                    path.display()
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::stage("scaffold", "template missing");
        assert!(err.to_string().contains("scaffold"));
        assert!(err.to_string().contains("template missing"));

        let err = PipelineError::MissingInput("prompt.txt".to_string());
        assert!(err.to_string().contains("prompt.txt"));
    }

    #[test]
    fn test_stage_failure_keeps_pass_error() {
        let source = TmdlError::UnbalancedExpression {
            path: PathBuf::from("tables/Orders.tmdl"),
            line: 12,
            opens: 4,
            closes: 1,
        };
        let err = PipelineError::stage_failure("polish-tables", source);
        assert_eq!(err.stage_name(), Some("polish-tables"));
        assert!(matches!(
            err.tmdl_error(),
            Some(TmdlError::UnbalancedExpression { line: 12, .. })
        ));
        let msg = err.user_message();
        assert!(msg.contains("tables/Orders.tmdl"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_io_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PipelineError::io_with_path("/path/to/file", "reading config", io_err);
        let display = err.to_string();
        assert!(display.contains("/path/to/file"));
        assert!(display.contains("reading config"));
    }

    #[test]
    fn test_user_message() {
        let err = PipelineError::FileNotFound(PathBuf::from("/data/pbip-tmdl.toml"));
        let msg = err.user_message();
        assert!(msg.contains("/data/pbip-tmdl.toml"));
        assert!(msg.contains("Hint:"));
    }
}

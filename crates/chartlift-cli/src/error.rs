//! CLI error types with exit code handling

use chartlift_core::CoreError;
use chartlift_pipeline::PipelineError;
use chartlift_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Flags or references the user got wrong
    #[error("Invalid input: {message}")]
    #[diagnostic(code(chartlift::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Repository configuration or client setup failed
    #[error("Repository error: {message}")]
    #[diagnostic(code(chartlift::cli::repository))]
    Repository {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A pipeline run failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartlift::cli::io))]
    Io { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Repository { .. } => exit_codes::FETCH_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Pipeline(err) => match err {
                PipelineError::Load {
                    source: CoreError::InvalidReference { .. },
                } => exit_codes::INPUT_ERROR,
                PipelineError::Load {
                    source: CoreError::Fetch { .. },
                } => exit_codes::FETCH_ERROR,
                PipelineError::Load { .. } | PipelineError::ChartWrite { .. } => {
                    exit_codes::CHART_ERROR
                }
                PipelineError::ImagesWrite { .. } => exit_codes::IMAGE_ERROR,
                PipelineError::InvalidConfig { .. } => exit_codes::USAGE_ERROR,
                PipelineError::Report(_) => exit_codes::IO_ERROR,
            },
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let help = match &err {
            RepoError::InvalidRepositoryUrl { .. } => {
                Some("use an http(s)://, oci:// or file:// URL, or a local directory".to_string())
            }
            RepoError::InvalidTls { .. } => Some("check the path given to --ca-file".to_string()),
            _ => None,
        };
        CliError::Repository {
            message: err.to_string(),
            help,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

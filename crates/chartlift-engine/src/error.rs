//! Engine error types

use chartlift_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error("Template error in {template}: {message}")]
    #[diagnostic(code(chartlift::template::render))]
    Template { template: String, message: String },

    #[error("Failed to parse template {template}: {message}")]
    #[diagnostic(code(chartlift::template::parse))]
    Parse { template: String, message: String },

    #[error("Failed to load subchart {path}: {source}")]
    #[diagnostic(code(chartlift::template::subchart))]
    Subchart {
        path: String,
        #[source]
        source: CoreError,
    },

    #[error("Invalid values.yaml: {0}")]
    #[diagnostic(
        code(chartlift::template::values),
        help("values.yaml must be a YAML mapping")
    )]
    Values(#[from] serde_yaml::Error),

    #[error("Template {template} is not valid UTF-8")]
    #[diagnostic(code(chartlift::template::encoding))]
    Encoding { template: String },
}

impl EngineError {
    /// Wrap a MiniJinja failure, keeping its detailed display (source line and marker)
    pub fn from_minijinja(err: minijinja::Error, template: &str) -> Self {
        Self::Template {
            template: template.to_string(),
            message: format!("{:#}", err).trim_end().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

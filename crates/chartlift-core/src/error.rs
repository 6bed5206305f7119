//! Core error types

use thiserror::Error;

/// Boxed error used to carry failures from pluggable collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid chart reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("Invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("Chart.yaml not found in {path}")]
    ChartNotFound { path: String },

    #[error("Path '{path}' escapes destination {root}")]
    PathEscape { path: String, root: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Failed to fetch chart '{reference}': {source}")]
    Fetch {
        reference: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to load chart '{reference}': {source}")]
    Load {
        reference: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Failed to render chart '{chart}': {source}")]
    Render {
        chart: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to transfer image '{image}': {source}")]
    Transfer {
        image: String,
        #[source]
        source: BoxError,
    },
}

impl CoreError {
    pub fn fetch(reference: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Fetch {
            reference: reference.into(),
            source: source.into(),
        }
    }

    /// Attach the chart reference to a staging failure; fetch errors already name it
    pub fn load(reference: impl Into<String>, source: CoreError) -> Self {
        match source {
            err @ (Self::Fetch { .. } | Self::Load { .. }) => err,
            other => Self::Load {
                reference: reference.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn render(chart: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Render {
            chart: chart.into(),
            source: source.into(),
        }
    }

    pub fn transfer(image: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transfer {
            image: image.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_names_the_reference() {
        let err = CoreError::load(
            "broken",
            CoreError::InvalidChart {
                message: "missing name".to_string(),
            },
        );
        assert!(matches!(&err, CoreError::Load { reference, .. } if reference == "broken"));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_load_keeps_fetch_errors() {
        let fetch = CoreError::fetch("nginx:1.0.0", "connection refused");
        let err = CoreError::load("nginx:1.0.0", fetch);
        assert!(matches!(err, CoreError::Fetch { .. }));
    }
}

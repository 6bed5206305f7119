//! Pipeline error types

use chartlift_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Result type for pipeline runs
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A failed run, tagged with the stage and chart it failed in
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("failed to load charts")]
    #[diagnostic(
        code(chartlift::pipeline::load),
        help("check the chart references and that the repository is reachable")
    )]
    Load {
        #[source]
        source: CoreError,
    },

    #[error("failed to write chart '{chart}'")]
    #[diagnostic(code(chartlift::pipeline::chart_write))]
    ChartWrite {
        chart: String,
        #[source]
        source: CoreError,
    },

    #[error("failed to write images of chart '{chart}'")]
    #[diagnostic(
        code(chartlift::pipeline::images_write),
        help("rerun with --dry-run to list the images without pulling them")
    )]
    ImagesWrite {
        chart: String,
        #[source]
        source: CoreError,
    },

    #[error("invalid pipeline configuration: {message}")]
    #[diagnostic(code(chartlift::pipeline::config))]
    InvalidConfig { message: String },

    #[error("failed to emit report: {0}")]
    #[diagnostic(code(chartlift::pipeline::report))]
    Report(#[from] std::io::Error),
}

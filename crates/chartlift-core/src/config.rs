//! Per-run pipeline options

use serde::{Deserialize, Serialize};

/// Options shared by every component of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Keep the raw chart files next to the packaged archive
    #[serde(default)]
    pub include_chart_files: bool,

    /// Discover and record images without pulling or saving them
    #[serde(default)]
    pub dry_run: bool,
}

impl PipelineConfig {
    pub fn new(include_chart_files: bool, dry_run: bool) -> Self {
        Self {
            include_chart_files,
            dry_run,
        }
    }
}

//! State shared by every stage of one run

use chartlift_core::{PipelineConfig, ReportTree};

/// Options plus the report being built; created fresh for each run
#[derive(Debug, Default)]
pub struct RunContext {
    pub config: PipelineConfig,
    pub report: ReportTree,
}

impl RunContext {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            report: ReportTree::new(),
        }
    }

    pub fn include_chart_files(&self) -> bool {
        self.config.include_chart_files
    }

    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }
}

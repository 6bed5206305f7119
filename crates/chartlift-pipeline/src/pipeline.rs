//! Pipeline orchestrator
//!
//! A `Packager` drives one chart loader, one chart writer and one images
//! writer over a batch of charts:
//!
//! 1. load every chart
//! 2. sort by name (stable)
//! 3. per chart: chart writer, then images writer; the first error aborts
//! 4. finish loader, chart writer, images writer, always, in that order
//! 5. print the report, only when step 3 completed

use chartlift_core::{Chart, PipelineConfig, ReportTree};
use std::io::Write;

use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::images::{ImagesWriter, NoopImagesWriter};
use crate::loader::ChartLoader;
use crate::writer::{ChartWriter, NoopChartWriter};

/// Pipeline builder
pub struct Builder {
    chart_loader: Option<Box<dyn ChartLoader>>,
    chart_writer: Option<Box<dyn ChartWriter>>,
    images_writer: Option<Box<dyn ImagesWriter>>,
    config: PipelineConfig,
    output: Option<Box<dyn Write>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            chart_loader: None,
            chart_writer: None,
            images_writer: None,
            config: PipelineConfig::default(),
            output: None,
        }
    }

    pub fn with_chart_loader(mut self, loader: impl ChartLoader + 'static) -> Self {
        self.chart_loader = Some(Box::new(loader));
        self
    }

    /// Defaults to a writer that records nothing
    pub fn with_chart_writer(mut self, writer: impl ChartWriter + 'static) -> Self {
        self.chart_writer = Some(Box::new(writer));
        self
    }

    /// Defaults to a writer that records nothing
    pub fn with_images_writer(mut self, writer: impl ImagesWriter + 'static) -> Self {
        self.images_writer = Some(Box::new(writer));
        self
    }

    pub fn chart_files_included(mut self, included: bool) -> Self {
        self.config.include_chart_files = included;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Where the report is printed; stdout by default
    pub fn output(mut self, output: impl Write + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn complete(self) -> Result<Packager> {
        let chart_loader = self.chart_loader.ok_or_else(|| PipelineError::InvalidConfig {
            message: "a chart loader is required".to_string(),
        })?;

        Ok(Packager {
            chart_loader,
            chart_writer: self
                .chart_writer
                .unwrap_or_else(|| Box::new(NoopChartWriter)),
            images_writer: self
                .images_writer
                .unwrap_or_else(|| Box::new(NoopImagesWriter)),
            config: self.config,
            output: self
                .output
                .unwrap_or_else(|| Box::new(std::io::stdout())),
            report: ReportTree::new(),
        })
    }
}

/// A configured pipeline; `process` runs the whole batch
pub struct Packager {
    chart_loader: Box<dyn ChartLoader>,
    chart_writer: Box<dyn ChartWriter>,
    images_writer: Box<dyn ImagesWriter>,
    config: PipelineConfig,
    output: Box<dyn Write>,
    report: ReportTree,
}

impl Packager {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Report of the last run, including the charts recorded before a failure
    pub fn report(&self) -> &ReportTree {
        &self.report
    }

    /// Run the batch; each call starts from an empty report
    pub fn process(&mut self) -> Result<&ReportTree> {
        let mut ctx = RunContext::new(self.config);

        let outcome = self.run(&mut ctx);
        self.finish(&ctx);
        self.report = ctx.report;
        outcome?;

        write!(self.output, "{}", self.report)?;
        self.output.flush()?;
        Ok(&self.report)
    }

    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let mut charts = self
            .chart_loader
            .load(ctx)
            .map_err(|source| PipelineError::Load { source })?;

        sort_charts(&mut charts);
        tracing::debug!(charts = charts.len(), "loaded charts");

        for chart in &charts {
            self.chart_writer
                .write(chart, ctx)
                .map_err(|source| PipelineError::ChartWrite {
                    chart: chart.name().to_string(),
                    source,
                })?;
            self.images_writer
                .write(chart, ctx)
                .map_err(|source| PipelineError::ImagesWrite {
                    chart: chart.name().to_string(),
                    source,
                })?;
            tracing::debug!(chart = chart.name(), "processed chart");
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &RunContext) {
        if let Err(e) = self.chart_loader.finish(ctx) {
            tracing::warn!(error = %e, "chart loader cleanup failed");
        }
        if let Err(e) = self.chart_writer.finish(ctx) {
            tracing::warn!(error = %e, "chart writer cleanup failed");
        }
        if let Err(e) = self.images_writer.finish(ctx) {
            tracing::warn!(error = %e, "images writer cleanup failed");
        }
    }
}

/// Stable sort by chart name
fn sort_charts(charts: &mut [Chart]) {
    charts.sort_by(|a, b| a.name().cmp(b.name()));
}

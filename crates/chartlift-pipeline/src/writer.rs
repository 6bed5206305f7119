//! Chart artifact writers

use chartlift_core::{Chart, Result, save_chart, secure_join, write_files};
use std::path::PathBuf;

use crate::context::RunContext;
use crate::loader::{CHART_DIR, remove_staged};

/// Persists each chart and records what it produced
pub trait ChartWriter {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()>;

    fn finish(&mut self, ctx: &RunContext) -> Result<()>;
}

impl<T: ChartWriter + ?Sized> ChartWriter for Box<T> {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()> {
        (**self).write(chart, ctx)
    }

    fn finish(&mut self, ctx: &RunContext) -> Result<()> {
        (**self).finish(ctx)
    }
}

/// Writes `to_dir/<name>/chart/*` and packages it as `to_dir/<name>/<name>-<version>.tgz`
///
/// The archive is built from the files read back from disk, not from the
/// in-memory chart.
pub struct FileChartWriter {
    to_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl FileChartWriter {
    pub fn new(to_dir: impl Into<PathBuf>) -> Self {
        Self {
            to_dir: to_dir.into(),
            written: Vec::new(),
        }
    }
}

impl ChartWriter for FileChartWriter {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()> {
        let chart_root = secure_join(&self.to_dir, chart.name())?;
        let chart_dir = chart_root.join(CHART_DIR);

        if chart_dir.exists() {
            std::fs::remove_dir_all(&chart_dir)?;
        }
        if !self.written.contains(&chart_dir) {
            self.written.push(chart_dir.clone());
        }
        write_files(&chart_dir, &chart.files)?;

        let on_disk = Chart::load_dir(&chart_dir)?;
        let archive = save_chart(&on_disk, &chart_root)?;
        tracing::debug!(chart = chart.name(), archive = %archive.display(), "packaged chart");

        ctx.report.add_archive(chart.name(), &on_disk.archive_name());
        if ctx.include_chart_files() {
            ctx.report.add_files(chart.name(), on_disk.file_paths());
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &RunContext) -> Result<()> {
        if !ctx.include_chart_files() {
            for dir in self.written.drain(..) {
                remove_staged(&dir);
            }
        }
        Ok(())
    }
}

/// Records what would be written without touching the disk
#[derive(Debug, Default)]
pub struct ConsoleChartWriter;

impl ChartWriter for ConsoleChartWriter {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()> {
        ctx.report.add_archive(chart.name(), &chart.archive_name());
        if ctx.include_chart_files() {
            ctx.report.add_files(chart.name(), chart.file_paths());
        }
        Ok(())
    }

    fn finish(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopChartWriter;

impl ChartWriter for NoopChartWriter {
    fn write(&mut self, _chart: &Chart, _ctx: &mut RunContext) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

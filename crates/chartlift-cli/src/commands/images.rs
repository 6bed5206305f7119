//! Images command - list the images a local chart references

use chartlift_engine::ChartRenderer;
use chartlift_pipeline::{Builder, ConsoleImagesWriter, DirTree, EmbeddedChartLoader};
use console::style;
use std::path::Path;

use crate::error::{CliError, Result};

pub fn run(path: &Path, strict: bool) -> Result<()> {
    if !path.is_dir() {
        return Err(CliError::input_with_help(
            format!("{} is not a directory", path.display()),
            "pass the directory containing Chart.yaml",
        ));
    }

    let renderer = ChartRenderer::builder().strict(strict).build();
    let mut packager = Builder::new()
        .with_chart_loader(EmbeddedChartLoader::new(DirTree::new(path)))
        .with_images_writer(ConsoleImagesWriter::new(renderer))
        .complete()?;

    let report = packager.process()?;
    if report.is_empty() {
        eprintln!("{} no images referenced", style("!").yellow().bold());
    }
    Ok(())
}

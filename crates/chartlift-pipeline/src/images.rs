//! Image discovery and transfer writers
//!
//! Every variant renders the chart the same way; they differ only in what
//! happens to the discovered references.

use chartlift_core::{
    Chart, ImageReference, ImageTransfer, ManifestRenderer, Result, collect_images, secure_join,
};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::context::RunContext;

/// Directory holding a chart's image archives below its output directory
pub const IMAGES_DIR: &str = "images";

/// Handles the images referenced by each chart
pub trait ImagesWriter {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()>;

    fn finish(&mut self, ctx: &RunContext) -> Result<()>;
}

impl<T: ImagesWriter + ?Sized> ImagesWriter for Box<T> {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()> {
        (**self).write(chart, ctx)
    }

    fn finish(&mut self, ctx: &RunContext) -> Result<()> {
        (**self).finish(ctx)
    }
}

/// Render a chart and return its image references, unique and sorted
pub fn discover_images<R: ManifestRenderer + ?Sized>(
    renderer: &R,
    chart: &Chart,
) -> Result<Vec<ImageReference>> {
    let manifest = renderer.render(chart)?;
    let images = collect_images(&manifest)?;
    tracing::debug!(chart = chart.name(), images = images.len(), "discovered images");
    Ok(images)
}

/// Discover a chart's images and record them under its branch
fn discover_and_record<R: ManifestRenderer + ?Sized>(
    renderer: &R,
    chart: &Chart,
    ctx: &mut RunContext,
) -> Result<Vec<ImageReference>> {
    let images = discover_images(renderer, chart)?;
    if !images.is_empty() {
        ctx.report.add_images(chart.name(), &images);
    }
    Ok(images)
}

/// Pulls every image and saves it to `to_dir/<chart>/images/<repo>-<tag>.tar`
pub struct FileImagesWriter<R, T> {
    to_dir: PathBuf,
    renderer: R,
    transfer: T,
}

impl<R: ManifestRenderer, T: ImageTransfer> FileImagesWriter<R, T> {
    pub fn new(to_dir: impl Into<PathBuf>, renderer: R, transfer: T) -> Self {
        Self {
            to_dir: to_dir.into(),
            renderer,
            transfer,
        }
    }
}

impl<R: ManifestRenderer, T: ImageTransfer> ImagesWriter for FileImagesWriter<R, T> {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()> {
        let images = discover_and_record(&self.renderer, chart, ctx)?;
        if images.is_empty() {
            return Ok(());
        }
        if ctx.dry_run() {
            tracing::debug!(chart = chart.name(), "dry run, skipping image transfer");
            return Ok(());
        }

        let images_dir = secure_join(&self.to_dir, chart.name())?.join(IMAGES_DIR);
        let mut claimed = HashMap::new();
        for image in &images {
            let archive_name = image.archive_name();
            if let Some(previous) = claim_archive_name(&mut claimed, image) {
                tracing::warn!(
                    chart = chart.name(),
                    image = %image,
                    previous = %previous,
                    archive = %archive_name,
                    "image archive name already used, overwriting"
                );
            }
            let target = secure_join(&images_dir, &archive_name)?;
            let pulled = self.transfer.pull(image)?;
            self.transfer.save(&pulled, &target)?;
            tracing::info!(image = %image, path = %target.display(), "saved image");
        }
        Ok(())
    }

    fn finish(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

/// Claim `image`'s archive name, returning the image that held it before
fn claim_archive_name(
    claimed: &mut HashMap<String, ImageReference>,
    image: &ImageReference,
) -> Option<ImageReference> {
    claimed
        .insert(image.archive_name(), image.clone())
        .filter(|previous| previous != image)
}

/// Records discovered images without transferring them
pub struct ConsoleImagesWriter<R> {
    renderer: R,
}

impl<R: ManifestRenderer> ConsoleImagesWriter<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }
}

impl<R: ManifestRenderer> ImagesWriter for ConsoleImagesWriter<R> {
    fn write(&mut self, chart: &Chart, ctx: &mut RunContext) -> Result<()> {
        discover_and_record(&self.renderer, chart, ctx).map(|_| ())
    }

    fn finish(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopImagesWriter;

impl ImagesWriter for NoopImagesWriter {
    fn write(&mut self, _chart: &Chart, _ctx: &mut RunContext) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

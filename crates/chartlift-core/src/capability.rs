//! Traits for the external collaborators a run depends on
//!
//! Implementations:
//! - `ChartFetcher`: HTTP, OCI and directory sources in `chartlift-repo`
//! - `ManifestRenderer`: the template engine in `chartlift-engine`
//! - `ImageTransfer`: the registry client in `chartlift-repo`

use std::path::{Path, PathBuf};

use crate::chart::{Chart, ChartReference};
use crate::error::Result;
use crate::image::{ImageReference, PulledImage};

/// Resolves a chart reference and downloads its packaged archive
pub trait ChartFetcher {
    /// Download the archive for `reference` into `dest_dir`, returning its path
    fn fetch(&self, reference: &ChartReference, dest_dir: &Path) -> Result<PathBuf>;
}

/// Renders a chart into one multi-document manifest
pub trait ManifestRenderer {
    fn render(&self, chart: &Chart) -> Result<String>;
}

/// Moves container images from a registry to local archives
pub trait ImageTransfer {
    fn pull(&self, image: &ImageReference) -> Result<PulledImage>;

    fn save(&self, image: &PulledImage, path: &Path) -> Result<()>;
}

impl<T: ChartFetcher + ?Sized> ChartFetcher for Box<T> {
    fn fetch(&self, reference: &ChartReference, dest_dir: &Path) -> Result<PathBuf> {
        (**self).fetch(reference, dest_dir)
    }
}

impl<T: ManifestRenderer + ?Sized> ManifestRenderer for Box<T> {
    fn render(&self, chart: &Chart) -> Result<String> {
        (**self).render(chart)
    }
}

impl<T: ImageTransfer + ?Sized> ImageTransfer for Box<T> {
    fn pull(&self, image: &ImageReference) -> Result<PulledImage> {
        (**self).pull(image)
    }

    fn save(&self, image: &PulledImage, path: &Path) -> Result<()> {
        (**self).save(image, path)
    }
}

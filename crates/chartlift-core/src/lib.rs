//! chartlift Core - chart model, archives and image discovery
//!
//! This crate provides the foundational types used throughout chartlift:
//! - `Chart`: a loaded chart (metadata plus raw files)
//! - `ChartReference`: a requested `name[:version]`
//! - `archive`: Helm-compatible packaging and path-safe extraction
//! - `image`: schema-agnostic discovery of container image references
//! - `ReportTree`: the run's record of produced artifacts
//! - capability traits for fetching, rendering and image transfer

pub mod archive;
pub mod capability;
pub mod chart;
pub mod config;
pub mod error;
pub mod image;
pub mod report;

pub use archive::{
    extract_archive, extract_archive_file, read_archive, save_chart, save_image_tarball,
    secure_join, write_files,
};
pub use capability::{ChartFetcher, ImageTransfer, ManifestRenderer};
pub use chart::{
    CHART_FILE, Chart, ChartDependency, ChartFile, ChartMetadata, ChartReference, read_dir_files,
};
pub use config::PipelineConfig;
pub use error::{BoxError, CoreError, Result};
pub use image::{ImageReference, PulledImage, collect_images, filter_images};
pub use report::{ReportNode, ReportTree};

//! chartlift Pipeline - load charts, write artifacts, discover images
//!
//! Three plugin roles are composed by [`Builder`] into a [`Packager`]:
//!
//! - [`ChartLoader`]: remote (fetch + extract) or embedded (file tree)
//! - [`ChartWriter`]: file, console or no-op
//! - [`ImagesWriter`]: file (pull + save), console or no-op
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartlift_pipeline::{Builder, ConsoleChartWriter, EmbeddedChartLoader, DirTree};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut packager = Builder::new()
//!     .with_chart_loader(EmbeddedChartLoader::new(DirTree::new("./my-chart")))
//!     .with_chart_writer(ConsoleChartWriter)
//!     .chart_files_included(true)
//!     .complete()?;
//!
//! packager.process()?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod images;
pub mod loader;
pub mod pipeline;
pub mod writer;

pub use context::RunContext;
pub use error::{PipelineError, Result};
pub use images::{
    ConsoleImagesWriter, FileImagesWriter, IMAGES_DIR, ImagesWriter, NoopImagesWriter,
    discover_images,
};
pub use loader::{
    CHART_DIR, ChartLoader, DirTree, EmbeddedChartLoader, FileTree, MemoryTree,
    RemoteChartLoader,
};
pub use pipeline::{Builder, Packager};
pub use writer::{ChartWriter, ConsoleChartWriter, FileChartWriter, NoopChartWriter};

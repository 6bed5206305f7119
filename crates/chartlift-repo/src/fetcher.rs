//! Blocking `ChartFetcher` on top of an async chart source

use chartlift_core::{ChartFetcher, ChartReference, CoreError};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tokio::sync::Mutex;

use crate::backend::{ChartSource, create_source};
use crate::config::Repository;
use crate::credentials::ResolvedCredentials;
use crate::error::Result;

/// Downloads packaged charts from one repository
///
/// Owns a single-threaded runtime so the pipeline can stay synchronous.
pub struct RemoteChartSource {
    runtime: Runtime,
    source: Mutex<Box<dyn ChartSource>>,
}

impl RemoteChartSource {
    pub fn new(repo: Repository, credentials: Option<ResolvedCredentials>) -> Result<Self> {
        let source = create_source(repo, credentials)?;
        Self::from_source(source)
    }

    pub fn from_source(source: Box<dyn ChartSource>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            source: Mutex::new(source),
        })
    }

    async fn fetch_async(&self, reference: &ChartReference, dest_dir: &Path) -> Result<PathBuf> {
        let mut source = self.source.lock().await;
        let (entry, data) = source.fetch(reference).await?;

        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(format!("{}-{}.tgz", entry.name, entry.version));
        std::fs::write(&path, &data)?;

        tracing::info!(
            chart = %entry.name,
            version = %entry.version,
            repo = %source.name(),
            "downloaded chart"
        );
        Ok(path)
    }
}

impl ChartFetcher for RemoteChartSource {
    fn fetch(&self, reference: &ChartReference, dest_dir: &Path) -> chartlift_core::Result<PathBuf> {
        self.runtime
            .block_on(self.fetch_async(reference, dest_dir))
            .map_err(|e| CoreError::fetch(reference.to_string(), e))
    }
}

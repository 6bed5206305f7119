//! Chart acquisition strategies
//!
//! - `RemoteChartLoader`: fetch packaged charts and extract them into staging
//! - `EmbeddedChartLoader`: parse one chart from a read-only file tree

use chartlift_core::{
    Chart, ChartFetcher, ChartFile, ChartReference, CoreError, Result, extract_archive_file,
    read_dir_files, secure_join,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::RunContext;

/// Directory holding a chart's raw files below its staging directory
pub const CHART_DIR: &str = "chart";

/// Produces the charts of a run
pub trait ChartLoader {
    fn load(&mut self, ctx: &RunContext) -> Result<Vec<Chart>>;

    /// Release whatever `load` staged; called once per run, even after a failure
    fn finish(&mut self, ctx: &RunContext) -> Result<()>;
}

impl<T: ChartLoader + ?Sized> ChartLoader for Box<T> {
    fn load(&mut self, ctx: &RunContext) -> Result<Vec<Chart>> {
        (**self).load(ctx)
    }

    fn finish(&mut self, ctx: &RunContext) -> Result<()> {
        (**self).finish(ctx)
    }
}

/// Remove a staged directory, logging instead of failing
pub(crate) fn remove_staged(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match std::fs::remove_dir_all(dir) {
        Ok(()) => tracing::debug!(path = %dir.display(), "removed chart files"),
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "failed to remove chart files"),
    }
}

/// Fetches every requested reference and stages it under `to_dir/<name>/`
pub struct RemoteChartLoader<F> {
    fetcher: F,
    references: Vec<String>,
    to_dir: PathBuf,
    staged: Vec<PathBuf>,
}

impl<F: ChartFetcher> RemoteChartLoader<F> {
    pub fn new<I, S>(fetcher: F, references: I, to_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fetcher,
            references: references.into_iter().map(Into::into).collect(),
            to_dir: to_dir.into(),
            staged: Vec::new(),
        }
    }

    fn load_one(&mut self, reference: &ChartReference) -> Result<Chart> {
        let staging = secure_join(&self.to_dir, &reference.name)?;
        let chart_dir = staging.join(CHART_DIR);

        // Stale files from an earlier run would end up in the chart
        if chart_dir.exists() {
            std::fs::remove_dir_all(&chart_dir)?;
        }
        self.staged.push(chart_dir.clone());

        let archive = self.fetcher.fetch(reference, &staging)?;
        extract_archive_file(&archive, &chart_dir)?;
        let chart = Chart::load_dir(&chart_dir)?;

        tracing::debug!(
            reference = %reference,
            chart = chart.name(),
            version = %chart.version(),
            "loaded chart"
        );
        Ok(chart)
    }
}

impl<F: ChartFetcher> ChartLoader for RemoteChartLoader<F> {
    fn load(&mut self, _ctx: &RunContext) -> Result<Vec<Chart>> {
        self.staged.clear();
        let references = ChartReference::parse_list(&self.references)?;

        references
            .iter()
            .map(|reference| {
                self.load_one(reference)
                    .map_err(|e| CoreError::load(reference.to_string(), e))
            })
            .collect()
    }

    fn finish(&mut self, ctx: &RunContext) -> Result<()> {
        if !ctx.include_chart_files() {
            for dir in &self.staged {
                remove_staged(dir);
            }
        }
        Ok(())
    }
}

/// A read-only tree of chart files
pub trait FileTree {
    /// Every regular file, paths relative to the chart root
    fn files(&self) -> Result<Vec<ChartFile>>;
}

/// A chart directory on disk
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileTree for DirTree {
    fn files(&self) -> Result<Vec<ChartFile>> {
        read_dir_files(&self.root)
    }
}

/// An in-memory chart, keyed by relative path
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }
}

impl FileTree for MemoryTree {
    fn files(&self) -> Result<Vec<ChartFile>> {
        Ok(self
            .files
            .iter()
            .map(|(path, data)| ChartFile::new(path.clone(), data.clone()))
            .collect())
    }
}

/// Loads exactly one chart from a file tree; nothing is staged
pub struct EmbeddedChartLoader<T> {
    tree: T,
}

impl<T: FileTree> EmbeddedChartLoader<T> {
    pub fn new(tree: T) -> Self {
        Self { tree }
    }
}

impl<T: FileTree> ChartLoader for EmbeddedChartLoader<T> {
    fn load(&mut self, _ctx: &RunContext) -> Result<Vec<Chart>> {
        let chart = Chart::from_files(self.tree.files()?)?;
        Ok(vec![chart])
    }

    fn finish(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartlift_core::{CHART_FILE, CoreError, PipelineConfig, save_chart};
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Packages charts on demand from an in-memory catalogue
    struct FakeFetcher {
        calls: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChartFetcher for FakeFetcher {
        fn fetch(&self, reference: &ChartReference, dest_dir: &Path) -> Result<PathBuf> {
            self.calls.borrow_mut().push(reference.to_string());
            if reference.name == "missing" {
                return Err(CoreError::fetch(reference.to_string(), "chart not found"));
            }
            if reference.name == "broken" {
                std::fs::create_dir_all(dest_dir)?;
                let path = dest_dir.join("broken-1.0.0.tgz");
                std::fs::write(&path, "not a gzip stream")?;
                return Ok(path);
            }
            let version = reference.version.as_deref().unwrap_or("1.0.0");
            let mut chart = Chart::from_files(vec![
                ChartFile::new(
                    CHART_FILE,
                    format!("apiVersion: v2\nname: {}\nversion: {}\n", reference.name, version),
                ),
                ChartFile::new("templates/pod.yaml", "image: busybox:1.36\n"),
            ])?;
            if reference.name == "badmeta" {
                chart.files[0].data = b"name: [unclosed\n".to_vec();
            }
            save_chart(&chart, dest_dir)
        }
    }

    fn error_chain(err: &CoreError) -> String {
        let mut chain = vec![err.to_string()];
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        chain.join(" | ")
    }

    fn ctx(include: bool) -> RunContext {
        RunContext::new(PipelineConfig::new(include, false))
    }

    #[test]
    fn test_remote_load_stages_and_parses() {
        let dir = TempDir::new().unwrap();
        let mut loader =
            RemoteChartLoader::new(FakeFetcher::new(), ["nginx", "apache:10.2.3"], dir.path());

        let charts = loader.load(&ctx(false)).unwrap();
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].name(), "nginx");
        assert_eq!(charts[1].version().to_string(), "10.2.3");

        assert!(dir.path().join("apache/apache-10.2.3.tgz").exists());
        assert!(dir.path().join("apache/chart/templates/pod.yaml").exists());
    }

    #[test]
    fn test_remote_finish_removes_chart_files() {
        let dir = TempDir::new().unwrap();
        let mut loader = RemoteChartLoader::new(FakeFetcher::new(), ["nginx"], dir.path());
        let ctx = ctx(false);

        loader.load(&ctx).unwrap();
        loader.finish(&ctx).unwrap();

        assert!(!dir.path().join("nginx/chart").exists());
        assert!(dir.path().join("nginx/nginx-1.0.0.tgz").exists());
    }

    #[test]
    fn test_remote_finish_keeps_chart_files_when_included() {
        let dir = TempDir::new().unwrap();
        let mut loader = RemoteChartLoader::new(FakeFetcher::new(), ["nginx"], dir.path());
        let ctx = ctx(true);

        loader.load(&ctx).unwrap();
        loader.finish(&ctx).unwrap();

        assert!(dir.path().join("nginx/chart/Chart.yaml").exists());
    }

    #[test]
    fn test_invalid_reference_fails_before_fetching() {
        let dir = TempDir::new().unwrap();
        let mut loader = RemoteChartLoader::new(FakeFetcher::new(), ["nginx", ":1.0"], dir.path());

        let err = loader.load(&ctx(false)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidReference { .. }));
        assert!(loader.fetcher.calls.borrow().is_empty());
    }

    #[test]
    fn test_fetch_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut loader =
            RemoteChartLoader::new(FakeFetcher::new(), ["missing", "nginx"], dir.path());

        let err = loader.load(&ctx(false)).unwrap_err();
        assert!(matches!(err, CoreError::Fetch { .. }));
        assert_eq!(*loader.fetcher.calls.borrow(), vec!["missing".to_string()]);
    }

    #[test]
    fn test_corrupt_archive_names_the_chart() {
        let dir = TempDir::new().unwrap();
        let mut loader =
            RemoteChartLoader::new(FakeFetcher::new(), ["nginx", "broken"], dir.path());

        let err = loader.load(&ctx(false)).unwrap_err();
        assert!(matches!(&err, CoreError::Load { reference, .. } if reference == "broken"));
        assert!(error_chain(&err).contains("broken"));
    }

    #[test]
    fn test_bad_chart_yaml_names_the_chart() {
        let dir = TempDir::new().unwrap();
        let mut loader =
            RemoteChartLoader::new(FakeFetcher::new(), ["badmeta:2.0.0"], dir.path());

        let err = loader.load(&ctx(false)).unwrap_err();
        assert!(matches!(&err, CoreError::Load { reference, .. } if reference == "badmeta:2.0.0"));
        assert!(error_chain(&err).starts_with("Failed to load chart 'badmeta:2.0.0'"));
    }

    #[test]
    fn test_stale_chart_files_are_replaced() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("nginx/chart/templates/old.yaml");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "image: stale:1\n").unwrap();

        let mut loader = RemoteChartLoader::new(FakeFetcher::new(), ["nginx"], dir.path());
        let charts = loader.load(&ctx(true)).unwrap();

        assert!(!stale.exists());
        assert!(charts[0].file("templates/old.yaml").is_none());
    }

    #[test]
    fn test_embedded_memory_tree() {
        let tree = MemoryTree::new()
            .with_file("templates/deploy.yaml", "image: redis:7\n")
            .with_file(CHART_FILE, "apiVersion: v2\nname: cache\nversion: 0.1.0\n");
        let mut loader = EmbeddedChartLoader::new(tree);

        let charts = loader.load(&ctx(false)).unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].name(), "cache");
        assert_eq!(charts[0].files.len(), 2);
        assert!(loader.finish(&ctx(false)).is_ok());
    }

    #[test]
    fn test_embedded_dir_tree() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CHART_FILE),
            "apiVersion: v2\nname: web\nversion: 2.0.0\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/svc.yaml"), "kind: Service\n").unwrap();

        let mut loader = EmbeddedChartLoader::new(DirTree::new(dir.path()));
        let charts = loader.load(&ctx(false)).unwrap();
        assert_eq!(charts[0].name(), "web");
        assert!(charts[0].file("templates/svc.yaml").is_some());
    }

    #[test]
    fn test_embedded_tree_without_chart_yaml() {
        let tree = MemoryTree::new().with_file("values.yaml", "a: 1\n");
        let mut loader = EmbeddedChartLoader::new(tree);
        assert!(matches!(
            loader.load(&ctx(false)),
            Err(CoreError::InvalidChart { .. })
        ));
    }
}

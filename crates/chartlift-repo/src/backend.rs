//! Unified chart source trait
//!
//! Provides a single interface for all repository types (HTTP, OCI, File)

use async_trait::async_trait;
use chartlift_core::{Chart, ChartReference, read_archive};
use std::path::PathBuf;

use crate::config::{Repository, RepositoryType};
use crate::credentials::ResolvedCredentials;
use crate::error::{RepoError, Result};
use crate::http::HttpRepository;
use crate::index::{ChartEntry, best_match, highest_version, is_constraint};
use crate::oci::OciRegistry;

/// Unified chart source trait
#[async_trait]
pub trait ChartSource: Send + Sync {
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    fn repo_type(&self) -> RepositoryType;

    /// Resolve a name and optional version (exact or constraint) to one entry
    async fn resolve(&mut self, name: &str, version: Option<&str>) -> Result<ChartEntry>;

    /// Download a resolved chart archive
    async fn download(&self, entry: &ChartEntry) -> Result<Vec<u8>>;

    /// Resolve then download
    async fn fetch(&mut self, reference: &ChartReference) -> Result<(ChartEntry, Vec<u8>)> {
        let entry = self
            .resolve(&reference.name, reference.version.as_deref())
            .await?;
        let data = self.download(&entry).await?;
        Ok((entry, data))
    }
}

/// Create a chart source from a repository definition
pub fn create_source(
    repo: Repository,
    credentials: Option<ResolvedCredentials>,
) -> Result<Box<dyn ChartSource>> {
    match repo.repo_type {
        RepositoryType::Http => Ok(Box::new(HttpSource(HttpRepository::new(
            repo,
            credentials,
        )?))),
        RepositoryType::Oci => Ok(Box::new(OciSource(OciRegistry::new(repo, credentials)?))),
        RepositoryType::File => Ok(Box::new(FileSource::new(repo)?)),
    }
}

// ============ HTTP Source Wrapper ============

struct HttpSource(HttpRepository);

#[async_trait]
impl ChartSource for HttpSource {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn url(&self) -> &str {
        self.0.url()
    }

    fn repo_type(&self) -> RepositoryType {
        RepositoryType::Http
    }

    async fn resolve(&mut self, name: &str, version: Option<&str>) -> Result<ChartEntry> {
        self.0.resolve(name, version).await
    }

    async fn download(&self, entry: &ChartEntry) -> Result<Vec<u8>> {
        self.0.download(entry).await
    }
}

// ============ OCI Source Wrapper ============

struct OciSource(OciRegistry);

#[async_trait]
impl ChartSource for OciSource {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn url(&self) -> &str {
        self.0.url()
    }

    fn repo_type(&self) -> RepositoryType {
        RepositoryType::Oci
    }

    async fn resolve(&mut self, name: &str, version: Option<&str>) -> Result<ChartEntry> {
        self.0.resolve(name, version).await
    }

    async fn download(&self, entry: &ChartEntry) -> Result<Vec<u8>> {
        self.0.pull(&entry.name, &entry.version).await
    }
}

// ============ File Source ============

/// A local directory of packaged `.tgz` charts
struct FileSource {
    repo: Repository,
    root: PathBuf,
}

impl FileSource {
    fn new(repo: Repository) -> Result<Self> {
        let root = repo.local_path();
        if !root.is_dir() {
            return Err(RepoError::RepositoryNotFound {
                path: root.display().to_string(),
            });
        }
        Ok(Self { repo, root })
    }

    /// Read the metadata of every packaged chart in the directory
    fn list(&self) -> Result<Vec<ChartEntry>> {
        let mut entries = Vec::new();

        for dir_entry in std::fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tgz") {
                continue;
            }

            let file = std::fs::File::open(&path)?;
            let chart = match read_archive(file).and_then(Chart::from_files) {
                Ok(chart) => chart,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable chart archive");
                    continue;
                }
            };

            entries.push(ChartEntry {
                name: chart.metadata.name.clone(),
                version: chart.version().to_string(),
                app_version: chart.metadata.app_version.clone(),
                description: chart.metadata.description.clone(),
                urls: vec![format!("file://{}", path.display())],
                ..Default::default()
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl ChartSource for FileSource {
    fn name(&self) -> &str {
        &self.repo.name
    }

    fn url(&self) -> &str {
        &self.repo.url
    }

    fn repo_type(&self) -> RepositoryType {
        RepositoryType::File
    }

    async fn resolve(&mut self, name: &str, version: Option<&str>) -> Result<ChartEntry> {
        let candidates: Vec<ChartEntry> =
            self.list()?.into_iter().filter(|e| e.name == name).collect();
        if candidates.is_empty() {
            return Err(RepoError::ChartNotFound {
                name: name.to_string(),
                repo: self.repo.name.clone(),
            });
        }

        let versions = candidates.iter().map(|e| e.version.as_str());
        let picked = match version {
            None => highest_version(versions),
            Some(constraint) if is_constraint(constraint) => {
                Some(best_match(name, versions, constraint)?)
            }
            Some(exact) => versions
                .into_iter()
                .find(|v| *v == exact.trim_start_matches('v')),
        }
        .map(str::to_string)
        .ok_or_else(|| RepoError::VersionNotFound {
            name: name.to_string(),
            version: version.unwrap_or_default().to_string(),
            repo: self.repo.name.clone(),
        })?;

        candidates
            .into_iter()
            .find(|e| e.version == picked)
            .ok_or_else(|| RepoError::ChartNotFound {
                name: name.to_string(),
                repo: self.repo.name.clone(),
            })
    }

    async fn download(&self, entry: &ChartEntry) -> Result<Vec<u8>> {
        let url = entry.download_url().ok_or_else(|| RepoError::ChartNotFound {
            name: entry.name.clone(),
            repo: self.repo.name.clone(),
        })?;
        Ok(std::fs::read(url.trim_start_matches("file://"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartlift_core::{CHART_FILE, ChartFile, save_chart};
    use tempfile::TempDir;

    fn package(dir: &std::path::Path, name: &str, version: &str) {
        let chart = Chart::from_files(vec![ChartFile::new(
            CHART_FILE,
            format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
        )])
        .unwrap();
        save_chart(&chart, dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_source_resolution() {
        let dir = TempDir::new().unwrap();
        package(dir.path(), "nginx", "1.0.0");
        package(dir.path(), "nginx", "1.4.2");
        package(dir.path(), "apache", "0.1.0");
        std::fs::write(dir.path().join("README.md"), "not a chart").unwrap();

        let repo = Repository::from_url(format!("file://{}", dir.path().display())).unwrap();
        let mut source = create_source(repo, None).unwrap();
        assert_eq!(source.repo_type(), RepositoryType::File);

        let latest = source.resolve("nginx", None).await.unwrap();
        assert_eq!(latest.version, "1.4.2");

        let exact = source.resolve("nginx", Some("1.0.0")).await.unwrap();
        assert_eq!(exact.version, "1.0.0");

        let constrained = source.resolve("nginx", Some("~1.0")).await.unwrap();
        assert_eq!(constrained.version, "1.0.0");

        assert!(matches!(
            source.resolve("nginx", Some("2.0.0")).await,
            Err(RepoError::VersionNotFound { .. })
        ));
        assert!(matches!(
            source.resolve("redis", None).await,
            Err(RepoError::ChartNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_source_fetch() {
        let dir = TempDir::new().unwrap();
        package(dir.path(), "apache", "0.1.0");

        let repo = Repository::from_url(dir.path().display().to_string()).unwrap();
        let mut source = create_source(repo, None).unwrap();

        let reference = ChartReference::parse("apache").unwrap();
        let (entry, data) = source.fetch(&reference).await.unwrap();
        assert_eq!(entry.version, "0.1.0");

        let files = read_archive(data.as_slice()).unwrap();
        assert!(files.iter().any(|f| f.path == CHART_FILE));
    }

    #[test]
    fn test_missing_directory() {
        let repo = Repository::from_url("/nonexistent/charts").unwrap();
        assert!(matches!(
            create_source(repo, None),
            Err(RepoError::RepositoryNotFound { .. })
        ));
    }
}

//! HTTP repository implementation
//!
//! Supports traditional Helm-style HTTP repositories with index.yaml

use url::Url;

use crate::config::Repository;
use crate::credentials::{ResolvedCredentials, SecureHttpClient};
use crate::error::{RepoError, Result};
use crate::index::{ChartEntry, ChartIndex};

/// HTTP repository client
pub struct HttpRepository {
    repo: Repository,
    /// HTTP client with secure credential handling
    client: SecureHttpClient,
    /// Index fetched on first use
    cached_index: Option<ChartIndex>,
}

impl HttpRepository {
    /// Create a new HTTP repository client
    pub fn new(repo: Repository, credentials: Option<ResolvedCredentials>) -> Result<Self> {
        let mut client = SecureHttpClient::new(&repo.tls)?;
        if let Some(creds) = credentials {
            client = client.with_credentials(&repo.url, creds);
        }

        Ok(Self {
            repo,
            client,
            cached_index: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.repo.name
    }

    pub fn url(&self) -> &str {
        &self.repo.url
    }

    /// Fetch the repository index once per client
    pub async fn fetch_index(&mut self) -> Result<&ChartIndex> {
        if self.cached_index.is_none() {
            let index_url = self.repo.index_url();
            let data = match self.client.get_bytes(&index_url).await {
                Err(RepoError::HttpError { status: 404, .. }) => {
                    return Err(RepoError::IndexNotFound { url: index_url });
                }
                other => other?,
            };
            let index = ChartIndex::from_bytes(&data)?;
            tracing::debug!(
                repo = %self.repo.name,
                charts = index.entries.len(),
                "fetched repository index"
            );
            self.cached_index = Some(index);
        }

        self.cached_index
            .as_ref()
            .ok_or_else(|| RepoError::IndexNotFound {
                url: self.repo.index_url(),
            })
    }

    /// Resolve a chart name and optional version against the index
    pub async fn resolve(&mut self, name: &str, version: Option<&str>) -> Result<ChartEntry> {
        let repo_name = self.repo.name.clone();
        let index = self.fetch_index().await?;
        index.resolve(name, version, &repo_name).cloned()
    }

    /// Absolute download URL for an entry; relative URLs resolve against the repository
    pub fn download_url(&self, entry: &ChartEntry) -> Result<String> {
        let url = entry.download_url().ok_or_else(|| RepoError::ChartNotFound {
            name: entry.name.clone(),
            repo: self.repo.name.clone(),
        })?;

        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }

        let base = Url::parse(&format!("{}/", self.repo.url.trim_end_matches('/')))?;
        Ok(base.join(url)?.to_string())
    }

    /// Download a chart archive, verifying its digest when the index has one
    pub async fn download(&self, entry: &ChartEntry) -> Result<Vec<u8>> {
        let full_url = self.download_url(entry)?;
        let data = self.client.get_bytes(&full_url).await?;

        if let Some(expected_digest) = &entry.digest {
            let actual_digest = compute_digest(&data);
            if !digest_matches(expected_digest, &actual_digest) {
                return Err(RepoError::IntegrityCheckFailed {
                    name: entry.name.clone(),
                    expected: expected_digest.clone(),
                    actual: actual_digest,
                });
            }
        }

        Ok(data)
    }
}

/// Compute SHA256 digest of data
pub(crate) fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Check if two digests match (supports various formats)
fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| {
        d.trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    };
    normalize(expected) == normalize(actual)
}

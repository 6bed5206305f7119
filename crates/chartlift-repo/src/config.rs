//! Chart repository definition
//!
//! A repository is identified by URL; its type is detected from the scheme.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RepoError, Result};

/// Repository definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Display name used in logs and errors
    pub name: String,

    /// Repository URL (HTTP(S), OCI or local directory)
    pub url: String,

    /// Repository type (auto-detected if not specified)
    #[serde(default)]
    pub repo_type: RepositoryType,

    /// TLS settings for HTTP and OCI repositories
    #[serde(default)]
    pub tls: TlsOptions,
}

/// TLS settings shared by chart sources and the image registry client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// PEM CA bundle added to the trusted roots
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Skip TLS verification (insecure, not recommended)
    #[serde(default)]
    pub insecure_skip_tls: bool,

    /// Talk plain HTTP to OCI registries
    #[serde(default)]
    pub plain_http: bool,
}

impl TlsOptions {
    /// Read the configured CA bundle, if any
    pub fn ca_certificate(&self) -> Result<Option<Vec<u8>>> {
        match &self.ca_file {
            Some(path) => std::fs::read(path).map(Some).map_err(|e| RepoError::InvalidTls {
                message: format!("cannot read CA file {}: {}", path.display(), e),
            }),
            None => Ok(None),
        }
    }
}

impl Repository {
    /// Create a new repository from URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let url = url.into();
        let repo_type = RepositoryType::detect(&url)?;

        Ok(Self {
            name,
            url,
            repo_type,
            tls: TlsOptions::default(),
        })
    }

    /// Create a repository named after its URL
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Self::new(url.clone(), url)
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Get the index URL for HTTP repositories
    pub fn index_url(&self) -> String {
        match &self.repo_type {
            RepositoryType::Http => {
                let base = self.url.trim_end_matches('/');
                format!("{}/index.yaml", base)
            }
            RepositoryType::Oci | RepositoryType::File => self.url.clone(),
        }
    }

    /// Local directory of a file repository
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.url.trim_start_matches("file://"))
    }

    pub fn is_oci(&self) -> bool {
        matches!(self.repo_type, RepositoryType::Oci)
    }
}

/// Repository type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Traditional HTTP repository with index.yaml
    #[default]
    Http,

    /// OCI-compliant registry
    Oci,

    /// Local directory of packaged charts
    File,
}

impl RepositoryType {
    /// Auto-detect repository type from URL
    pub fn detect(url: &str) -> Result<Self> {
        if url.starts_with("oci://") {
            Ok(RepositoryType::Oci)
        } else if url.starts_with("file://") || url.starts_with('/') {
            Ok(RepositoryType::File)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Ok(RepositoryType::Http)
        } else {
            Err(RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "URL must start with http://, https://, oci://, file://, or /".to_string(),
            })
        }
    }
}

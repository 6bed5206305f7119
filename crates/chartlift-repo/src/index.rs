//! Helm repository index
//!
//! Only the fields needed to resolve and download a chart are modelled;
//! unknown keys in `index.yaml` are ignored.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{RepoError, Result};

/// Repository index (`index.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions indexed by name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

/// One chart version in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// URLs to download the chart archive, absolute or relative to the repository
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl ChartEntry {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    pub fn parsed_version(&self) -> Option<Version> {
        parse_version(&self.version)
    }
}

fn parse_version(version: &str) -> Option<Version> {
    Version::parse(version.trim_start_matches('v')).ok()
}

/// Semver ordering; unparseable versions sort below parseable ones
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Whether a requested version is a constraint rather than an exact version
pub fn is_constraint(version: &str) -> bool {
    version.starts_with(['^', '~', '>', '<', '=', '*'])
}

/// Pick the highest version string out of a list
pub fn highest_version<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions.into_iter().max_by(|a, b| compare_versions(a, b))
}

/// Pick the highest version matching a semver constraint
pub fn best_match<'a>(
    name: &str,
    versions: impl IntoIterator<Item = &'a str>,
    constraint: &str,
) -> Result<&'a str> {
    let req = semver::VersionReq::parse(constraint).map_err(|e| RepoError::InvalidVersion {
        name: name.to_string(),
        version: constraint.to_string(),
        message: e.to_string(),
    })?;

    let versions: Vec<&str> = versions.into_iter().collect();
    versions
        .iter()
        .copied()
        .filter(|v| parse_version(v).is_some_and(|parsed| req.matches(&parsed)))
        .max_by(|a, b| compare_versions(a, b))
        .ok_or_else(|| RepoError::UnsatisfiableConstraint {
            name: name.to_string(),
            constraint: constraint.to_string(),
            available: if versions.is_empty() {
                "none".to_string()
            } else {
                versions.join(", ")
            },
        })
}

impl ChartIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Get the latest (highest semver) version of a chart
    pub fn get_latest(&self, name: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    /// Get a specific version of a chart
    ///
    /// `1.0` does not match `1.0.0`, but `v1.0.0` does.
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        let entries = self.entries.get(name)?;
        entries.iter().find(|e| e.version == version).or_else(|| {
            let wanted = parse_version(version)?;
            entries
                .iter()
                .find(|e| e.parsed_version().is_some_and(|v| v == wanted))
        })
    }

    /// Find the highest version matching a constraint
    pub fn find_best_match(&self, name: &str, constraint: &str) -> Result<&ChartEntry> {
        let entries = self.entries.get(name).map(Vec::as_slice).unwrap_or_default();
        let version = best_match(name, entries.iter().map(|e| e.version.as_str()), constraint)?;
        entries
            .iter()
            .find(|e| e.version == version)
            .ok_or_else(|| RepoError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
                repo: String::new(),
            })
    }

    /// Resolve a requested version: none picks the highest, a constraint picks
    /// the best match, anything else must match exactly
    pub fn resolve(&self, name: &str, version: Option<&str>, repo: &str) -> Result<&ChartEntry> {
        if !self.entries.contains_key(name) {
            return Err(RepoError::ChartNotFound {
                name: name.to_string(),
                repo: repo.to_string(),
            });
        }

        match version {
            None => self.get_latest(name).ok_or_else(|| RepoError::ChartNotFound {
                name: name.to_string(),
                repo: repo.to_string(),
            }),
            Some(constraint) if is_constraint(constraint) => {
                self.find_best_match(name, constraint)
            }
            Some(exact) => self
                .get_version(name, exact)
                .ok_or_else(|| RepoError::VersionNotFound {
                    name: name.to_string(),
                    version: exact.to_string(),
                    repo: repo.to_string(),
                }),
        }
    }
}

//! Chart references, metadata and loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Name of the metadata file every chart must carry
pub const CHART_FILE: &str = "Chart.yaml";

/// A chart requested by name, optionally pinned to a version
///
/// Parsed from `name[:version]`. A missing version means the latest
/// version available in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartReference {
    pub name: String,
    pub version: Option<String>,
}

impl ChartReference {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parse a `name[:version]` token, splitting on the first `:`
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let (name, version) = match token.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (token, None),
        };

        if name.is_empty() {
            return Err(CoreError::InvalidReference {
                reference: token.to_string(),
                message: "chart name is empty".to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
        })
    }

    /// Parse several reference tokens, failing on the first bad one
    pub fn parse_list<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Self>> {
        tokens.iter().map(|t| Self::parse(t.as_ref())).collect()
    }
}

impl FromStr for ChartReference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ChartReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: Option<String>,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// `application` or `library`
    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,

    /// Subcharts declared under `dependencies:`
    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,
}

impl ChartMetadata {
    /// Library charts only provide named templates
    pub fn is_library(&self) -> bool {
        self.chart_type.as_deref() == Some("library")
    }

    /// The dependency entry for the subchart `name`, matched by name or alias
    pub fn dependency(&self, name: &str) -> Option<&ChartDependency> {
        self.dependencies
            .iter()
            .find(|d| d.name == name || d.alias.as_deref() == Some(name))
    }
}

/// One `dependencies:` entry of `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDependency {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    /// Comma-separated values paths; the first one set decides
    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub alias: Option<String>,
}

impl ChartDependency {
    /// Key of the subchart's values in the parent: the alias, else the name
    pub fn values_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// One raw file of a chart, path relative to the chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub path: String,
    pub data: Vec<u8>,
}

impl ChartFile {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// A loaded chart: parsed metadata plus every raw file it was built from
#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub files: Vec<ChartFile>,
}

impl Chart {
    /// Build a chart from its raw files. `Chart.yaml` must be among them.
    pub fn from_files(files: Vec<ChartFile>) -> Result<Self> {
        let chart_yaml = files
            .iter()
            .find(|f| f.path == CHART_FILE)
            .ok_or_else(|| CoreError::InvalidChart {
                message: format!("{} is missing", CHART_FILE),
            })?;

        let metadata: ChartMetadata = serde_yaml::from_slice(&chart_yaml.data)?;
        if metadata.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: "chart name must not be empty".to_string(),
            });
        }

        Ok(Self { metadata, files })
    }

    /// Load a chart from an unpacked directory
    pub fn load_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.join(CHART_FILE).is_file() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }
        Self::from_files(read_dir_files(root)?)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    /// File name of the packaged chart: `<name>-<version>.tgz`
    pub fn archive_name(&self) -> String {
        format!("{}-{}.tgz", self.metadata.name, self.metadata.version)
    }

    pub fn file(&self, path: &str) -> Option<&ChartFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Paths of every file in the chart, in load order
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }
}

/// Read every regular file below `root`, sorted by path
///
/// Paths are relative to `root` and always `/`-separated.
pub fn read_dir_files(root: &Path) -> Result<Vec<ChartFile>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| CoreError::InvalidChart {
                message: e.to_string(),
            })?;
        let path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(ChartFile::new(path, std::fs::read(entry.path())?));
    }
    Ok(files)
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Chart.yaml versions may be unquoted or carry a leading `v`
        let raw = serde_yaml::Value::deserialize(deserializer)?;
        let s = match raw {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a version string, got {:?}",
                    other
                )));
            }
        };
        Version::parse(s.trim_start_matches('v')).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chart_yaml(name: &str, version: &str) -> ChartFile {
        ChartFile::new(
            CHART_FILE,
            format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
        )
    }

    #[test]
    fn test_parse_reference_with_version() {
        let r = ChartReference::parse("apache:10.2.3").unwrap();
        assert_eq!(r.name, "apache");
        assert_eq!(r.version.as_deref(), Some("10.2.3"));
    }

    #[test]
    fn test_parse_reference_without_version() {
        let r = ChartReference::parse("nginx").unwrap();
        assert_eq!(r.name, "nginx");
        assert!(r.version.is_none());

        let r = ChartReference::parse("nginx:").unwrap();
        assert!(r.version.is_none());
    }

    #[test]
    fn test_parse_reference_splits_on_first_colon() {
        let r = ChartReference::parse("redis:1.0.0:extra").unwrap();
        assert_eq!(r.name, "redis");
        assert_eq!(r.version.as_deref(), Some("1.0.0:extra"));
    }

    #[test]
    fn test_parse_reference_empty_name() {
        assert!(matches!(
            ChartReference::parse(":1.0.0"),
            Err(CoreError::InvalidReference { .. })
        ));
        assert!(ChartReference::parse("").is_err());
    }

    #[test]
    fn test_parse_list_fails_on_first_bad_token() {
        let tokens = ["nginx", ":1.0", "redis"];
        assert!(ChartReference::parse_list(&tokens).is_err());

        let ok = ChartReference::parse_list(&["nginx", "redis:2.0.0"]).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[1].to_string(), "redis:2.0.0");
    }

    #[test]
    fn test_from_files() {
        let chart = Chart::from_files(vec![
            chart_yaml("demo", "1.2.3"),
            ChartFile::new("values.yaml", "replicas: 1\n"),
        ])
        .unwrap();

        assert_eq!(chart.name(), "demo");
        assert_eq!(chart.version().to_string(), "1.2.3");
        assert_eq!(chart.archive_name(), "demo-1.2.3.tgz");
        assert!(chart.file("values.yaml").is_some());
    }

    #[test]
    fn test_from_files_requires_chart_yaml() {
        let err = Chart::from_files(vec![ChartFile::new("values.yaml", "")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_from_files_rejects_bad_version() {
        assert!(Chart::from_files(vec![chart_yaml("demo", "not-a-version")]).is_err());
    }

    #[test]
    fn test_version_with_v_prefix() {
        let chart = Chart::from_files(vec![ChartFile::new(
            CHART_FILE,
            "name: demo\nversion: v1.0.0\n",
        )])
        .unwrap();
        assert_eq!(chart.version().to_string(), "1.0.0");
    }

    #[test]
    fn test_load_dir_sorted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("templates")).unwrap();
        std::fs::write(root.join(CHART_FILE), "name: demo\nversion: 0.1.0\n").unwrap();
        std::fs::write(root.join("values.yaml"), "{}\n").unwrap();
        std::fs::write(root.join("templates/svc.yaml"), "kind: Service\n").unwrap();
        std::fs::write(root.join("templates/deploy.yaml"), "kind: Deployment\n").unwrap();

        let chart = Chart::load_dir(root).unwrap();
        let paths: Vec<_> = chart.file_paths().collect();
        assert_eq!(
            paths,
            vec![
                "Chart.yaml",
                "templates/deploy.yaml",
                "templates/svc.yaml",
                "values.yaml"
            ]
        );
    }

    #[test]
    fn test_load_dir_missing_chart_yaml() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Chart::load_dir(temp.path()),
            Err(CoreError::ChartNotFound { .. })
        ));
    }

    #[test]
    fn test_dependencies_and_aliases() {
        let chart = Chart::from_files(vec![ChartFile::new(
            CHART_FILE,
            "name: app\nversion: 1.0.0\ndependencies:\n  - name: redis\n    version: 17.x\n    condition: redis.enabled,global.redis.enabled\n  - name: common\n    alias: lib\n",
        )])
        .unwrap();

        let redis = chart.metadata.dependency("redis").unwrap();
        assert_eq!(redis.values_key(), "redis");
        assert_eq!(
            redis.condition.as_deref(),
            Some("redis.enabled,global.redis.enabled")
        );
        assert_eq!(chart.metadata.dependency("lib").unwrap().name, "common");
        assert!(chart.metadata.dependency("common").is_some());
        assert!(!chart.metadata.is_library());
    }
}

//! Container image references and discovery in rendered manifests
//!
//! Discovery is schema-agnostic: every YAML document is parsed
//! into a generic value tree and every mapping entry keyed exactly `image`
//! with a string value is collected, wherever it appears.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;

use crate::error::Result;

/// Mapping key that marks an image reference
pub const IMAGE_KEY: &str = "image";

static STARTS_WITH_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]").expect("valid regex"));

/// An image reference exactly as it appeared in a manifest
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local archive file name: `<repo>-<tag>.tar`
    ///
    /// `<repo>` is the last path segment of the repository. A reference
    /// without a tag uses `latest`; a digest-only reference uses the digest hex.
    pub fn archive_name(&self) -> String {
        let (name, digest) = match self.0.split_once('@') {
            Some((name, digest)) => (name, Some(digest)),
            None => (self.0.as_str(), None),
        };
        let base = name.rsplit('/').next().unwrap_or(name);

        let (repo, tag) = match base.split_once(':') {
            Some((repo, tag)) => (repo, tag.to_string()),
            None => {
                let tag = digest
                    .map(|d| d.rsplit(':').next().unwrap_or(d).to_string())
                    .unwrap_or_else(|| "latest".to_string());
                (base, tag)
            }
        };

        format!("{}-{}.tar", repo, tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageReference {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An image fetched from a registry, ready to be saved locally
#[derive(Debug, Clone)]
pub struct PulledImage {
    pub reference: ImageReference,
    /// Raw image config blob
    pub config: Vec<u8>,
    /// Compressed layer blobs, in manifest order
    pub layers: Vec<Vec<u8>>,
}

/// Collect every image reference in a (multi-document) manifest
///
/// Results are filtered to values starting with an ASCII letter,
/// deduplicated and sorted.
pub fn collect_images(manifest: &str) -> Result<Vec<ImageReference>> {
    let mut found = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = Value::deserialize(document)?;
        visit(&value, &mut found);
    }
    Ok(filter_images(found))
}

/// Keep references starting with a letter, drop duplicates, sort ascending
pub fn filter_images<I, S>(candidates: I) -> Vec<ImageReference>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut images: Vec<ImageReference> = Vec::new();
    for candidate in candidates {
        let candidate = candidate.into();
        if !STARTS_WITH_LETTER.is_match(&candidate) {
            continue;
        }
        let image = ImageReference(candidate);
        if !images.contains(&image) {
            images.push(image);
        }
    }
    images.sort();
    images
}

fn visit(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if key.as_str() == Some(IMAGE_KEY) {
                    if let Some(image) = child.as_str() {
                        found.push(image.to_string());
                    }
                }
                visit(child, found);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                visit(item, found);
            }
        }
        Value::Tagged(tagged) => visit(&tagged.value, found),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(images: &[ImageReference]) -> Vec<&str> {
        images.iter().map(|i| i.as_str()).collect()
    }

    #[test]
    fn test_collect_dedupes_and_drops_empty() {
        let manifest = r#"
apiVersion: v1
kind: Pod
spec:
  containers:
    - name: a
      image: foo:1.0
    - name: b
      image: foo:1.0
    - name: c
      image: ""
"#;
        let images = collect_images(manifest).unwrap();
        assert_eq!(strings(&images), vec!["foo:1.0"]);
    }

    #[test]
    fn test_collect_without_images() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\ndata:\n  key: value\n";
        assert!(collect_images(manifest).unwrap().is_empty());
        assert!(collect_images("").unwrap().is_empty());
    }

    #[test]
    fn test_collect_across_documents_sorted() {
        let manifest = r#"
# Source: demo/templates/deploy.yaml
kind: Deployment
spec:
  template:
    spec:
      initContainers:
        - image: busybox:1.36
      containers:
        - image: nginx:1.25
---
# Source: demo/templates/job.yaml
kind: Job
spec:
  template:
    spec:
      containers:
        - image: alpine:3.19
---
"#;
        let images = collect_images(manifest).unwrap();
        assert_eq!(
            strings(&images),
            vec!["alpine:3.19", "busybox:1.36", "nginx:1.25"]
        );
    }

    #[test]
    fn test_collect_ignores_non_string_and_unrelated_keys() {
        let manifest = r#"
kind: Custom
spec:
  image:
    repository: nginx
    tag: "1.0"
  imageName: redis:7
  images:
    - image: postgres:16
  count:
    image: 3
"#;
        let images = collect_images(manifest).unwrap();
        assert_eq!(strings(&images), vec!["postgres:16"]);
    }

    #[test]
    fn test_filter_drops_non_letter_prefixes() {
        let images = filter_images(vec!["{{ .Values.image }}", "1234", "_x", "Registry/app:1"]);
        assert_eq!(strings(&images), vec!["Registry/app:1"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let raw = vec!["b:1", "a:2", "b:1", "", "-x", "c"];
        let once = filter_images(raw);
        let twice = filter_images(once.iter().map(|i| i.as_str().to_string()));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_collect_rejects_invalid_yaml() {
        assert!(collect_images("key: [unclosed").is_err());
    }

    #[test]
    fn test_archive_name() {
        let cases = [
            ("nginx:1.25", "nginx-1.25.tar"),
            ("docker.io/bitnami/apache:2.4.58", "apache-2.4.58.tar"),
            ("registry:5000/team/app:v1", "app-v1.tar"),
            ("redis", "redis-latest.tar"),
            ("ghcr.io/org/tool@sha256:abc123", "tool-abc123.tar"),
            ("ghcr.io/org/tool:1.0@sha256:abc123", "tool-1.0.tar"),
        ];
        for (reference, expected) in cases {
            assert_eq!(ImageReference::new(reference).archive_name(), expected);
        }
    }
}

//! Chart archive packaging and path-safe extraction
//!
//! Packaged charts follow the Helm layout: a gzipped tar whose entries all
//! live under a top-level `<name>/` directory. Extraction strips that
//! directory and refuses any entry that would land outside the destination.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Header};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::chart::{Chart, ChartFile};
use crate::error::{CoreError, Result};
use crate::image::PulledImage;

/// Join `relative` onto `root`, refusing anything that could escape it
///
/// Absolute paths are rejected outright. `..` components are resolved
/// lexically and rejected as soon as they climb above `root`.
pub fn secure_join(root: &Path, relative: &str) -> Result<PathBuf> {
    let clean = normalize_relative(relative).ok_or_else(|| CoreError::PathEscape {
        path: relative.to_string(),
        root: root.display().to_string(),
    })?;
    Ok(root.join(clean))
}

/// Lexically clean a relative path. `None` if it is absolute or escapes.
fn normalize_relative(relative: &str) -> Option<PathBuf> {
    // Archive names always use `/`, but a backslash-rooted name is still absolute
    if relative.starts_with('/') || relative.starts_with('\\') {
        return None;
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}

/// Read every regular file of a packaged chart into memory
///
/// All entry names are validated before anything is returned, so a caller
/// writing the result to disk never sees a partially accepted archive.
pub fn read_archive<R: Read>(reader: R) -> Result<Vec<ChartFile>> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let clean = normalize_relative(&raw).ok_or_else(|| CoreError::PathEscape {
            path: raw.clone(),
            root: "archive root".to_string(),
        })?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        // Drop the leading `<chart>/` directory
        let inner: PathBuf = clean.components().skip(1).collect();
        if inner.as_os_str().is_empty() {
            continue;
        }
        let path = inner
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.push(ChartFile::new(path, data));
    }

    Ok(files)
}

/// Extract a packaged chart into `dest` and return the files written
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<Vec<ChartFile>> {
    let files = read_archive(reader)?;
    write_files(dest, &files)?;
    Ok(files)
}

/// Extract the packaged chart at `archive_path` into `dest`
pub fn extract_archive_file(archive_path: &Path, dest: &Path) -> Result<Vec<ChartFile>> {
    let file = File::open(archive_path)?;
    extract_archive(file, dest)
}

/// Write raw chart files below `dest`, creating directories as needed
///
/// Every target is checked with [`secure_join`] before the first write.
pub fn write_files(dest: &Path, files: &[ChartFile]) -> Result<()> {
    let targets = files
        .iter()
        .map(|f| secure_join(dest, &f.path))
        .collect::<Result<Vec<_>>>()?;

    std::fs::create_dir_all(dest)?;
    for (target, file) in targets.iter().zip(files) {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, &file.data)?;
    }
    Ok(())
}

/// Package a chart as `<out_dir>/<name>-<version>.tgz`
///
/// Returns the path to the created archive file.
pub fn save_chart(chart: &Chart, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let output = out_dir.join(chart.archive_name());

    let file = File::create(&output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for file in &chart.files {
        let archive_path = format!("{}/{}", chart.name(), file.path);
        add_bytes_to_archive(&mut builder, &archive_path, &file.data)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    Ok(output)
}

/// Entry of a `docker save` style `manifest.json`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImageManifestEntry {
    config: String,
    repo_tags: Vec<String>,
    layers: Vec<String>,
}

/// Write a pulled image as an uncompressed `docker load` compatible tarball
///
/// Layout: `manifest.json`, the config blob as `<hex>.json` and one
/// `<hex>.tar.gz` per layer.
pub fn save_image_tarball(image: &PulledImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config_name = format!("{}.json", hex::encode(Sha256::digest(&image.config)));
    let layer_names: Vec<String> = image
        .layers
        .iter()
        .map(|layer| format!("{}.tar.gz", hex::encode(Sha256::digest(layer))))
        .collect();

    let reference = image.reference.as_str();
    let repo_tags = if reference.contains('@') {
        Vec::new()
    } else if reference.rsplit('/').next().is_some_and(|base| base.contains(':')) {
        vec![reference.to_string()]
    } else {
        vec![format!("{}:latest", reference)]
    };

    let manifest = vec![ImageManifestEntry {
        config: config_name.clone(),
        repo_tags,
        layers: layer_names.clone(),
    }];
    let manifest = serde_json::to_vec(&manifest)?;

    let mut builder = Builder::new(File::create(path)?);
    add_bytes_to_archive(&mut builder, "manifest.json", &manifest)?;
    add_bytes_to_archive(&mut builder, &config_name, &image.config)?;
    for (name, layer) in layer_names.iter().zip(&image.layers) {
        add_bytes_to_archive(&mut builder, name, layer)?;
    }
    builder.into_inner()?.flush()?;

    Ok(())
}

/// Add bytes to a tar archive with a given path
pub(crate) fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0); // Reproducible builds: use epoch time
    header.set_cksum();

    builder
        .append_data(&mut header, archive_path, content)
        .map_err(|e| CoreError::Archive {
            message: format!("failed to add {}: {}", archive_path, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::CHART_FILE;
    use crate::image::ImageReference;
    use tar::EntryType;
    use tempfile::TempDir;

    fn sample_chart() -> Chart {
        Chart::from_files(vec![
            ChartFile::new(CHART_FILE, "apiVersion: v2\nname: demo\nversion: 1.0.0\n"),
            ChartFile::new("values.yaml", "image: nginx:1.25\n"),
            ChartFile::new("templates/deployment.yaml", "kind: Deployment\n"),
            ChartFile::new("files/blob.bin", vec![0u8, 159, 146, 150, 255]),
        ])
        .unwrap()
    }

    /// Build a gzipped tar whose entry names bypass the tar crate's own checks
    fn raw_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (name, data) in entries {
            let mut header = Header::new_old();
            let bytes = name.as_bytes();
            header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
            header.set_entry_type(EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, data.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_secure_join() {
        let root = Path::new("/dest");
        assert_eq!(
            secure_join(root, "templates/a.yaml").unwrap(),
            PathBuf::from("/dest/templates/a.yaml")
        );
        assert_eq!(
            secure_join(root, "templates/../values.yaml").unwrap(),
            PathBuf::from("/dest/values.yaml")
        );
        assert!(secure_join(root, "../escape.txt").is_err());
        assert!(secure_join(root, "a/../../escape.txt").is_err());
        assert!(secure_join(root, "/etc/passwd").is_err());
    }

    #[test]
    fn test_save_chart_layout() {
        let temp = TempDir::new().unwrap();
        let chart = sample_chart();

        let path = save_chart(&chart, temp.path()).unwrap();
        assert_eq!(path, temp.path().join("demo-1.0.0.tgz"));

        let mut archive = Archive::new(GzDecoder::new(File::open(&path).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| n.starts_with("demo/")));
        assert!(names.contains(&"demo/templates/deployment.yaml".to_string()));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let chart = sample_chart();

        // Raw files to disk, reload, repackage, extract again
        let staged = temp.path().join("staged");
        write_files(&staged, &chart.files).unwrap();
        let reloaded = Chart::load_dir(&staged).unwrap();
        let archive = save_chart(&reloaded, temp.path()).unwrap();

        let out = temp.path().join("out");
        let extracted = extract_archive_file(&archive, &out).unwrap();
        assert_eq!(extracted.len(), chart.files.len());

        for original in &chart.files {
            let on_disk = std::fs::read(out.join(&original.path)).unwrap();
            assert_eq!(on_disk, original.data, "{} differs", original.path);
        }
    }

    #[test]
    fn test_save_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let chart = sample_chart();

        let first = std::fs::read(save_chart(&chart, &temp.path().join("a")).unwrap()).unwrap();
        let second = std::fs::read(save_chart(&chart, &temp.path().join("b")).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_rejects_parent_escape() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dest");
        let data = raw_archive(&[
            ("demo/Chart.yaml", "name: demo\nversion: 1.0.0\n"),
            ("../escape.txt", "pwned"),
        ]);

        let err = extract_archive(data.as_slice(), &dest).unwrap_err();
        assert!(matches!(err, CoreError::PathEscape { .. }));
        assert!(!temp.path().join("escape.txt").exists());
        // Nothing was written, not even the valid entry
        assert!(!dest.exists());
    }

    #[test]
    fn test_extract_rejects_absolute_path() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dest");
        let target = temp.path().join("absolute.txt");
        let name = target.to_string_lossy().to_string();
        let data = raw_archive(&[(name.as_str(), "pwned")]);

        let err = extract_archive(data.as_slice(), &dest).unwrap_err();
        assert!(matches!(err, CoreError::PathEscape { .. }));
        assert!(!target.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_extract_strips_top_level_directory() {
        let temp = TempDir::new().unwrap();
        let data = raw_archive(&[
            ("demo/Chart.yaml", "name: demo\nversion: 1.0.0\n"),
            ("demo/templates/svc.yaml", "kind: Service\n"),
        ]);

        let files = extract_archive(data.as_slice(), temp.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Chart.yaml", "templates/svc.yaml"]);
        assert!(temp.path().join("templates/svc.yaml").is_file());
    }

    #[test]
    fn test_write_files_rejects_escape_before_writing() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dest");
        let files = vec![
            ChartFile::new("ok.txt", "fine"),
            ChartFile::new("../escape.txt", "bad"),
        ];

        assert!(write_files(&dest, &files).is_err());
        assert!(!dest.join("ok.txt").exists());
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_save_image_tarball() {
        let temp = TempDir::new().unwrap();
        let image = PulledImage {
            reference: ImageReference::new("docker.io/library/nginx:1.25"),
            config: br#"{"architecture":"amd64"}"#.to_vec(),
            layers: vec![b"layer-one".to_vec(), b"layer-two".to_vec()],
        };
        let path = temp.path().join("images").join("nginx-1.25.tar");

        save_image_tarball(&image, &path).unwrap();

        let mut archive = Archive::new(File::open(&path).unwrap());
        let mut manifest = None;
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            if name == "manifest.json" {
                let mut data = String::new();
                entry.read_to_string(&mut data).unwrap();
                manifest = Some(data);
            }
            names.push(name);
        }

        assert_eq!(names.len(), 4);
        let manifest: serde_json::Value = serde_json::from_str(&manifest.unwrap()).unwrap();
        assert_eq!(manifest[0]["RepoTags"][0], "docker.io/library/nginx:1.25");
        assert_eq!(manifest[0]["Layers"].as_array().unwrap().len(), 2);
        let config = manifest[0]["Config"].as_str().unwrap();
        assert!(config.ends_with(".json"));
        assert!(names.iter().any(|n| n == config));
    }
}

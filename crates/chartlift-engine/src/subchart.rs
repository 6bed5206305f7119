//! Subchart discovery
//!
//! Subcharts live in the parent's `charts/` directory, either unpacked
//! (`charts/<name>/Chart.yaml`) or packaged (`charts/<name>-<version>.tgz`).

use std::collections::BTreeMap;

use chartlift_core::{Chart, ChartDependency, ChartFile, read_archive};

use crate::error::{EngineError, Result};

pub const CHARTS_DIR: &str = "charts/";

/// Maximum nesting of subcharts below the chart being rendered
pub const MAX_DEPTH: usize = 10;

/// A subchart found below a parent chart
#[derive(Debug)]
pub struct SubchartInfo {
    /// Effective name: the dependency alias if set, otherwise the chart name
    pub name: String,

    /// Path inside the parent chart it was loaded from
    pub path: String,

    pub chart: Chart,

    /// The matching `dependencies:` entry of the parent, if any
    pub dependency: Option<ChartDependency>,
}

impl SubchartInfo {
    pub fn condition(&self) -> Option<&str> {
        self.dependency.as_ref().and_then(|d| d.condition.as_deref())
    }
}

/// Load the direct subcharts of `parent`, sorted by their path
pub fn discover_subcharts(parent: &Chart) -> Result<Vec<SubchartInfo>> {
    let mut unpacked: BTreeMap<&str, Vec<ChartFile>> = BTreeMap::new();
    let mut packaged: Vec<&ChartFile> = Vec::new();

    for file in &parent.files {
        let Some(rest) = file.path.strip_prefix(CHARTS_DIR) else {
            continue;
        };
        match rest.split_once('/') {
            Some((dir, inner)) => unpacked
                .entry(dir)
                .or_default()
                .push(ChartFile::new(inner, file.data.clone())),
            None if rest.ends_with(".tgz") => packaged.push(file),
            None => {}
        }
    }

    let mut found: BTreeMap<String, Chart> = BTreeMap::new();
    for (dir, files) in unpacked {
        let path = format!("{}{}", CHARTS_DIR, dir);
        if !files.iter().any(|f| f.path == chartlift_core::CHART_FILE) {
            tracing::debug!(chart = parent.name(), path = %path, "no Chart.yaml, not a subchart");
            continue;
        }
        let chart = Chart::from_files(files)
            .map_err(|source| EngineError::Subchart { path: path.clone(), source })?;
        found.insert(path, chart);
    }
    for file in packaged {
        let files = read_archive(file.data.as_slice()).map_err(|source| EngineError::Subchart {
            path: file.path.clone(),
            source,
        })?;
        let chart = Chart::from_files(files).map_err(|source| EngineError::Subchart {
            path: file.path.clone(),
            source,
        })?;
        found.insert(file.path.clone(), chart);
    }

    Ok(found
        .into_iter()
        .map(|(path, chart)| {
            let dependency = parent
                .metadata
                .dependencies
                .iter()
                .find(|d| d.name == chart.name())
                .cloned();
            let name = dependency
                .as_ref()
                .map(|d| d.values_key().to_string())
                .unwrap_or_else(|| chart.name().to_string());
            SubchartInfo {
                name,
                path,
                chart,
                dependency,
            }
        })
        .collect())
}

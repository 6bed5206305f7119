//! Chart renderer
//!
//! Templates live under `templates/` and are rendered with the chart's
//! default `values.yaml`. Files whose name starts with `_` are helpers:
//! they can be included or imported but are not rendered on their own.
//! `NOTES.txt` and the `crds/` directory are never part of the output.
//!
//! Each chart of the tree is rendered in its own flavour: Helm charts with
//! Go templates, anything else with MiniJinja. Subcharts under `charts/`
//! are rendered after their parent with values scoped under the parent's
//! `values.<subchart>`.

use std::borrow::Cow;

use chartlift_core::{Chart, CoreError, ManifestRenderer};
use minijinja::Environment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{EngineError, Result};
use crate::filters;
use crate::gotemplate::TemplateSet;
use crate::subchart::{self, discover_subcharts};
use crate::values::{self, condition_enabled, default_values};

/// Namespace used for the synthetic release
pub const FAKE_NAMESPACE: &str = "fake-namespace-name";

/// Cluster version reported through `.Capabilities`
pub const KUBE_VERSION: &str = "v1.31.0";

const TEMPLATES_DIR: &str = "templates/";
const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "tpl", "j2", "jinja2"];

/// API versions `.Capabilities.APIVersions.Has` answers true for
const API_VERSIONS: &[&str] = &[
    "v1",
    "apps/v1",
    "apps/v1/Deployment",
    "apps/v1/StatefulSet",
    "apps/v1/DaemonSet",
    "batch/v1",
    "batch/v1/Job",
    "batch/v1/CronJob",
    "autoscaling/v1",
    "autoscaling/v2",
    "autoscaling/v2/HorizontalPodAutoscaler",
    "networking.k8s.io/v1",
    "networking.k8s.io/v1/Ingress",
    "networking.k8s.io/v1/NetworkPolicy",
    "policy/v1",
    "policy/v1/PodDisruptionBudget",
    "rbac.authorization.k8s.io/v1",
    "storage.k8s.io/v1",
    "apiextensions.k8s.io/v1",
    "admissionregistration.k8s.io/v1",
    "coordination.k8s.io/v1",
    "discovery.k8s.io/v1",
    "scheduling.k8s.io/v1",
    "certificates.k8s.io/v1",
];

static JINJA_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%-?\s*\w|\{#").expect("valid regex"));

static GO_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\{\{-?\s*(?:define|end|include|template)\b|(?:^|[\s({$])\.(?:Values|Release|Chart|Capabilities|Files|Template)\b",
    )
    .expect("valid regex")
});

#[derive(Debug, Serialize)]
struct ReleaseContext<'a> {
    name: &'a str,
    namespace: &'a str,
    service: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartContext<'a> {
    name: &'a str,
    version: String,
    app_version: Option<&'a str>,
}

/// Template dialect of one chart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavour {
    /// Helm's Go `text/template` with sprig functions
    Go,
    /// MiniJinja with Helm-flavoured filters
    Jinja,
}

impl Flavour {
    /// Any Jinja block tag wins; otherwise Helm idioms select Go templates
    pub fn detect(chart: &Chart) -> Self {
        let sources: Vec<Cow<'_, str>> = chart
            .files
            .iter()
            .filter(|f| f.path.starts_with(TEMPLATES_DIR))
            .map(|f| String::from_utf8_lossy(&f.data))
            .collect();

        if sources.iter().any(|s| JINJA_MARKERS.is_match(s)) {
            Flavour::Jinja
        } else if sources.iter().any(|s| GO_MARKERS.is_match(s)) {
            Flavour::Go
        } else {
            Flavour::Jinja
        }
    }
}

/// A chart of the tree with the values it renders with
struct ChartUnit<'a> {
    /// `web` for the top chart, `web/charts/redis` below it
    prefix: String,
    chart: Cow<'a, Chart>,
    values: Value,
    flavour: Flavour,
}

/// Renderer builder
pub struct RendererBuilder {
    strict_mode: bool,
    namespace: String,
}

impl Default for RendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererBuilder {
    pub fn new() -> Self {
        Self {
            strict_mode: false,
            namespace: FAKE_NAMESPACE.to_string(),
        }
    }

    /// Fail on undefined variables instead of rendering them empty
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn build(self) -> ChartRenderer {
        ChartRenderer {
            strict_mode: self.strict_mode,
            namespace: self.namespace,
        }
    }
}

/// Renders every template of a chart and its subcharts into one multi-document manifest
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    strict_mode: bool,
    namespace: String,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        RendererBuilder::new().build()
    }
}

impl ChartRenderer {
    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| minijinja::AutoEscape::None);

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Chainable);
        }

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("quote", filters::quote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("sha256", filters::sha256sum);

        env.add_function("coalesce", filters::coalesce);
        env.add_function("ternary", filters::ternary);
        env.add_function("fail", filters::fail);

        env
    }

    /// Render a chart and its enabled subcharts, returning the concatenated manifest
    pub fn render_chart(&self, chart: &Chart) -> Result<String> {
        let mut units = Vec::new();
        let values = default_values(chart)?;
        collect_units(
            Cow::Borrowed(chart),
            chart.name().to_string(),
            values,
            0,
            &mut units,
        )?;

        let mut manifest = String::new();
        let release_name = chart.name();

        let go_units: Vec<&ChartUnit<'_>> =
            units.iter().filter(|u| u.flavour == Flavour::Go).collect();
        let go_set = if go_units.is_empty() {
            None
        } else {
            Some(build_template_set(&go_units)?)
        };

        for unit in &units {
            if unit.chart.metadata.is_library() {
                continue;
            }
            let rendered = match (&go_set, unit.flavour) {
                (Some(set), Flavour::Go) => self.render_go(set, unit, release_name)?,
                _ => self.render_jinja(unit, release_name)?,
            };
            manifest.push_str(&rendered);
        }

        tracing::debug!(
            chart = chart.name(),
            charts = units.len(),
            "rendered chart"
        );
        Ok(manifest)
    }

    fn render_jinja(&self, unit: &ChartUnit<'_>, release_name: &str) -> Result<String> {
        let mut env = self.create_environment();
        let mut rendered_names = Vec::new();

        for file in &unit.chart.files {
            let Some(name) = template_name(&file.path) else {
                continue;
            };
            let source = String::from_utf8(file.data.clone()).map_err(|_| {
                EngineError::Encoding {
                    template: source_path(&unit.prefix, name),
                }
            })?;
            env.add_template_owned(name.to_string(), source)
                .map_err(|e| EngineError::from_minijinja(e, &source_path(&unit.prefix, name)))?;

            if is_rendered(name) {
                rendered_names.push(name.to_string());
            }
        }

        let chart = &unit.chart;
        let ctx = minijinja::context! {
            values => &unit.values,
            release => ReleaseContext {
                name: release_name,
                namespace: &self.namespace,
                service: "chartlift",
            },
            chart => ChartContext {
                name: chart.name(),
                version: chart.version().to_string(),
                app_version: chart.metadata.app_version.as_deref(),
            },
        };

        let mut manifest = String::new();
        for name in &rendered_names {
            let path = source_path(&unit.prefix, name);
            let tmpl = env
                .get_template(name)
                .map_err(|e| EngineError::from_minijinja(e, &path))?;
            let rendered = tmpl
                .render(&ctx)
                .map_err(|e| EngineError::from_minijinja(e, &path))?;
            push_document(&mut manifest, &path, &rendered);
        }
        Ok(manifest)
    }

    fn render_go(&self, set: &TemplateSet, unit: &ChartUnit<'_>, release_name: &str) -> Result<String> {
        let mut data = self.go_context(unit, release_name);
        let mut names: Vec<&str> = unit
            .chart
            .files
            .iter()
            .filter_map(|f| template_name(&f.path))
            .filter(|name| is_rendered(name))
            .collect();
        names.sort_unstable();

        let mut manifest = String::new();
        for name in names {
            let path = source_path(&unit.prefix, name);
            data["Template"]["Name"] = Value::String(path.clone());
            let rendered = set.render(&path, &data, self.strict_mode)?;
            push_document(&mut manifest, &path, &rendered);
        }
        Ok(manifest)
    }

    /// The root object Helm templates see as `.`
    fn go_context(&self, unit: &ChartUnit<'_>, release_name: &str) -> Value {
        let chart = &unit.chart;
        let meta = &chart.metadata;
        let (major, minor) = kube_major_minor();

        let files: Map<String, Value> = chart
            .files
            .iter()
            .filter(|f| {
                !f.path.starts_with(TEMPLATES_DIR)
                    && !f.path.starts_with(subchart::CHARTS_DIR)
                    && f.path != chartlift_core::CHART_FILE
                    && f.path != values::VALUES_FILE
            })
            .map(|f| {
                (
                    f.path.clone(),
                    Value::String(String::from_utf8_lossy(&f.data).into_owned()),
                )
            })
            .collect();

        json!({
            "Values": unit.values,
            "Release": {
                "Name": release_name,
                "Namespace": self.namespace,
                "Service": "Helm",
                "IsInstall": true,
                "IsUpgrade": false,
                "Revision": 1,
            },
            "Chart": {
                "Name": meta.name,
                "Version": meta.version.to_string(),
                "AppVersion": meta.app_version.clone().unwrap_or_default(),
                "Description": meta.description.clone().unwrap_or_default(),
                "Type": meta.chart_type.clone().unwrap_or_else(|| "application".to_string()),
                "ApiVersion": meta.api_version.clone().unwrap_or_else(|| "v2".to_string()),
            },
            "Capabilities": {
                "KubeVersion": {
                    "Version": KUBE_VERSION,
                    "GitVersion": KUBE_VERSION,
                    "Major": major,
                    "Minor": minor,
                },
                "APIVersions": API_VERSIONS,
                "HelmVersion": { "Version": "v3.16.0" },
            },
            "Files": files,
            "Template": {
                "Name": "",
                "BasePath": format!("{}/templates", unit.prefix),
            },
        })
    }
}

impl ManifestRenderer for ChartRenderer {
    fn render(&self, chart: &Chart) -> chartlift_core::Result<String> {
        self.render_chart(chart)
            .map_err(|e| CoreError::render(chart.name(), e))
    }
}

/// Walk the chart tree depth first, skipping subcharts whose condition is false
fn collect_units<'a>(
    chart: Cow<'a, Chart>,
    prefix: String,
    values: Value,
    depth: usize,
    units: &mut Vec<ChartUnit<'a>>,
) -> Result<()> {
    let subcharts = if depth < subchart::MAX_DEPTH {
        discover_subcharts(&chart)?
    } else {
        tracing::warn!(chart = %prefix, max_depth = subchart::MAX_DEPTH, "subcharts nested too deep, not rendering them");
        Vec::new()
    };

    let flavour = Flavour::detect(&chart);
    let parent_values = values.clone();
    units.push(ChartUnit {
        prefix: prefix.clone(),
        chart,
        values,
        flavour,
    });

    for sub in subcharts {
        if !condition_enabled(sub.condition(), &parent_values) {
            tracing::debug!(chart = %prefix, subchart = %sub.name, "subchart disabled by condition");
            continue;
        }
        let defaults = default_values(&sub.chart)?;
        let scoped = values::for_subchart(defaults, &parent_values, &sub.name);
        let sub_prefix = format!("{}/{}{}", prefix, subchart::CHARTS_DIR, sub.name);
        collect_units(Cow::Owned(sub.chart), sub_prefix, scoped, depth + 1, units)?;
    }
    Ok(())
}

/// One template set for every Go chart of the tree so defines are shared
fn build_template_set(units: &[&ChartUnit<'_>]) -> Result<TemplateSet> {
    let mut set = TemplateSet::new();
    for unit in units {
        let mut files: Vec<_> = unit
            .chart
            .files
            .iter()
            .filter_map(|f| template_name(&f.path).map(|name| (name, f)))
            .collect();
        files.sort_by(|a, b| a.0.cmp(b.0));

        for (name, file) in files {
            let path = source_path(&unit.prefix, name);
            let source = std::str::from_utf8(&file.data).map_err(|_| EngineError::Encoding {
                template: path.clone(),
            })?;
            set.add(&path, source)?;
        }
    }
    Ok(set)
}

/// Path below `templates/` of a file the renderer understands
fn template_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix(TEMPLATES_DIR)?;
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    TEMPLATE_EXTENSIONS.contains(&extension).then_some(name)
}

fn is_rendered(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    !file_name.starts_with('_')
}

fn source_path(prefix: &str, name: &str) -> String {
    format!("{}/{}{}", prefix, TEMPLATES_DIR, name)
}

fn push_document(manifest: &mut String, path: &str, rendered: &str) {
    let trimmed = rendered.trim();
    if trimmed.is_empty() || trimmed == "---" {
        return;
    }
    manifest.push_str(&format!("---\n# Source: {}\n", path));
    manifest.push_str(rendered.trim_end());
    manifest.push('\n');
}

fn kube_major_minor() -> (String, String) {
    let mut parts = KUBE_VERSION.trim_start_matches('v').split('.');
    let major = parts.next().unwrap_or_default().to_string();
    let minor = parts.next().unwrap_or_default().to_string();
    (major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartlift_core::{CHART_FILE, ChartFile, archive::save_chart, collect_images};
    use tempfile::TempDir;

    fn chart(files: Vec<(&str, &str)>) -> Chart {
        let mut all = vec![ChartFile::new(
            CHART_FILE,
            "apiVersion: v2\nname: web\nversion: 1.2.0\nappVersion: \"2.4\"\n",
        )];
        all.extend(files.into_iter().map(|(p, c)| ChartFile::new(p, c)));
        Chart::from_files(all).unwrap()
    }

    fn image_list(manifest: &str) -> Vec<String> {
        collect_images(manifest)
            .unwrap()
            .iter()
            .map(|i| i.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_render_uses_values_and_release() {
        let chart = chart(vec![
            ("values.yaml", "image:\n  repository: nginx\n  tag: \"1.25\"\n"),
            (
                "templates/deployment.yaml",
                "kind: Deployment\nmetadata:\n  name: {{ release.name }}\n  namespace: {{ release.namespace }}\nspec:\n  template:\n    spec:\n      containers:\n        - image: \"{{ values.image.repository }}:{{ values.image.tag }}\"\n",
            ),
        ]);

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(manifest.contains("# Source: web/templates/deployment.yaml"));
        assert!(manifest.contains("name: web"));
        assert!(manifest.contains("namespace: fake-namespace-name"));
        assert_eq!(image_list(&manifest), vec!["nginx:1.25"]);
    }

    #[test]
    fn test_helpers_notes_and_crds_are_not_rendered() {
        let chart = chart(vec![
            ("templates/_helpers.tpl", "{% macro image(repo, tag) %}{{ repo }}:{{ tag }}{% endmacro %}"),
            (
                "templates/pod.yaml",
                "{% from \"_helpers.tpl\" import image %}kind: Pod\nspec:\n  containers:\n    - image: {{ image(\"redis\", \"7\") }}\n",
            ),
            ("templates/NOTES.txt", "image: should-not-appear:1\n"),
            ("crds/crd.yaml", "image: crd-image:1\n"),
        ]);

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(!manifest.contains("_helpers.tpl"));
        assert!(!manifest.contains("should-not-appear"));
        assert!(!manifest.contains("crd-image"));
        assert_eq!(image_list(&manifest), vec!["redis:7"]);
    }

    #[test]
    fn test_chart_context_and_coalesce() {
        let chart = chart(vec![(
            "templates/pod.yaml",
            "image: app:{{ coalesce(values.tag, chart.appVersion) }}\n",
        )]);
        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(manifest.contains("image: app:2.4"));
    }

    #[test]
    fn test_strict_mode_fails_on_undefined() {
        let chart = chart(vec![("templates/pod.yaml", "image: {{ values.missing.repo }}\n")]);

        assert!(ChartRenderer::default().render_chart(&chart).is_ok());
        let err = ChartRenderer::builder()
            .strict(true)
            .build()
            .render_chart(&chart)
            .unwrap_err();
        assert!(matches!(err, EngineError::Template { .. }));
    }

    #[test]
    fn test_empty_output_is_skipped() {
        let chart = chart(vec![
            ("values.yaml", ""),
            ("templates/optional.yaml", "{% if values.enabled %}kind: Service{% endif %}"),
        ]);
        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_render_error_maps_to_core_error() {
        let chart = chart(vec![("templates/bad.yaml", "{{ fail(\"boom\") }}")]);
        let err = ChartRenderer::default().render(&chart).unwrap_err();
        assert!(matches!(err, CoreError::Render { .. }));
    }

    const HELM_HELPERS: &str = r#"{{/* Image reference */}}
{{- define "web.image" -}}
{{- $registry := .Values.global.imageRegistry | default .Values.image.registry -}}
{{- printf "%s/%s:%s" $registry .Values.image.repository (.Values.image.tag | default .Chart.AppVersion) -}}
{{- end -}}
"#;

    const HELM_DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ .Release.Name }}
  namespace: {{ .Release.Namespace | quote }}
spec:
  template:
    spec:
      containers:
        - name: web
          image: {{ include "web.image" . | quote }}
        {{- range .Values.sidecars }}
        - name: {{ .name }}
          image: "{{ .image }}"
        {{- end }}
      {{- if .Values.metrics.enabled }}
        - name: metrics
          image: {{ .Values.metrics.image }}
      {{- end }}
"#;

    #[test]
    fn test_go_template_chart() {
        let chart = chart(vec![
            (
                "values.yaml",
                "global: {}\nimage:\n  registry: docker.io\n  repository: library/nginx\n  tag: \"1.25\"\nsidecars:\n  - name: proxy\n    image: envoyproxy/envoy:v1.30.1\nmetrics:\n  enabled: false\n  image: prom/exporter:1\n",
            ),
            ("templates/_helpers.tpl", HELM_HELPERS),
            ("templates/deployment.yaml", HELM_DEPLOYMENT),
        ]);
        assert_eq!(Flavour::detect(&chart), Flavour::Go);

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(manifest.contains("# Source: web/templates/deployment.yaml"));
        assert!(manifest.contains("namespace: \"fake-namespace-name\""));
        assert!(!manifest.contains("_helpers.tpl"));
        assert_eq!(
            image_list(&manifest),
            vec!["docker.io/library/nginx:1.25", "envoyproxy/envoy:v1.30.1"]
        );
    }

    #[test]
    fn test_go_template_falls_back_to_app_version() {
        let chart = chart(vec![
            ("values.yaml", "image:\n  registry: quay.io\n  repository: org/web\n"),
            ("templates/_helpers.tpl", HELM_HELPERS),
            ("templates/pod.yaml", "kind: Pod\nspec:\n  containers:\n    - image: {{ include \"web.image\" . }}\n"),
        ]);
        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert_eq!(image_list(&manifest), vec!["quay.io/org/web:2.4"]);
    }

    #[test]
    fn test_go_template_strict_mode() {
        let chart = chart(vec![(
            "templates/pod.yaml",
            "kind: Pod\nspec:\n  containers:\n    - image: {{ .Values.image.repository }}\n",
        )]);
        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(manifest.contains("- image: \n") || manifest.contains("- image:\n"));

        let err = ChartRenderer::builder()
            .strict(true)
            .build()
            .render_chart(&chart)
            .unwrap_err();
        assert!(matches!(err, EngineError::Template { ref template, .. } if template == "web/templates/pod.yaml"));
    }

    fn parent_with_redis(redis_files: Vec<(&str, &str)>) -> Chart {
        let mut files = vec![
            ChartFile::new(
                CHART_FILE,
                "apiVersion: v2\nname: web\nversion: 1.0.0\ndependencies:\n  - name: redis\n    version: 7.0.0\n    condition: redis.enabled\n",
            ),
            ChartFile::new(
                "values.yaml",
                "image: nginx:1.25\nglobal:\n  registry: mirror.local\nredis:\n  enabled: true\n  image:\n    tag: \"7.2\"\n",
            ),
            ChartFile::new("templates/web.yaml", "kind: Pod\nspec:\n  containers:\n    - image: {{ .Values.image }}\n"),
        ];
        files.extend(
            redis_files
                .into_iter()
                .map(|(p, c)| ChartFile::new(format!("charts/redis/{}", p), c)),
        );
        Chart::from_files(files).unwrap()
    }

    const REDIS_CHART: &[(&str, &str)] = &[
        ("Chart.yaml", "apiVersion: v2\nname: redis\nversion: 7.0.0\n"),
        ("values.yaml", "image:\n  repository: bitnami/redis\n  tag: \"7.0\"\n"),
        (
            "templates/sts.yaml",
            "kind: StatefulSet\nspec:\n  template:\n    spec:\n      containers:\n        - image: {{ .Values.global.registry }}/{{ .Values.image.repository }}:{{ .Values.image.tag }}\n",
        ),
    ];

    #[test]
    fn test_subchart_values_scoped_under_parent() {
        let chart = parent_with_redis(REDIS_CHART.to_vec());

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(manifest.contains("# Source: web/charts/redis/templates/sts.yaml"));
        assert_eq!(
            image_list(&manifest),
            vec!["mirror.local/bitnami/redis:7.2", "nginx:1.25"]
        );
    }

    #[test]
    fn test_subchart_disabled_by_condition() {
        let mut chart = parent_with_redis(REDIS_CHART.to_vec());
        for file in &mut chart.files {
            if file.path == "values.yaml" {
                file.data = b"image: nginx:1.25\nredis:\n  enabled: false\n".to_vec();
            }
        }

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(!manifest.contains("charts/redis"));
        assert_eq!(image_list(&manifest), vec!["nginx:1.25"]);
    }

    #[test]
    fn test_packaged_subchart_is_rendered() {
        let temp = TempDir::new().unwrap();
        let redis = Chart::from_files(
            REDIS_CHART
                .iter()
                .map(|(p, c)| ChartFile::new(*p, *c))
                .collect(),
        )
        .unwrap();
        let archive = save_chart(&redis, temp.path()).unwrap();

        let mut chart = parent_with_redis(Vec::new());
        chart.files.push(ChartFile::new(
            "charts/redis-7.0.0.tgz",
            std::fs::read(archive).unwrap(),
        ));

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert_eq!(
            image_list(&manifest),
            vec!["mirror.local/bitnami/redis:7.2", "nginx:1.25"]
        );
    }

    #[test]
    fn test_library_subchart_shares_defines() {
        let chart = Chart::from_files(vec![
            ChartFile::new(CHART_FILE, "apiVersion: v2\nname: web\nversion: 1.0.0\n"),
            ChartFile::new("values.yaml", "image:\n  repository: nginx\n  tag: \"1.25\"\n"),
            ChartFile::new(
                "templates/pod.yaml",
                "kind: Pod\nspec:\n  containers:\n    - image: {{ include \"common.image\" .Values.image }}\n",
            ),
            ChartFile::new(
                "charts/common/Chart.yaml",
                "apiVersion: v2\nname: common\nversion: 2.0.0\ntype: library\n",
            ),
            ChartFile::new(
                "charts/common/templates/_images.tpl",
                "{{- define \"common.image\" -}}{{ .repository }}:{{ .tag }}{{- end -}}",
            ),
            ChartFile::new("charts/common/templates/unused.yaml", "image: never:1\n"),
        ])
        .unwrap();

        let manifest = ChartRenderer::default().render_chart(&chart).unwrap();
        assert!(!manifest.contains("charts/common"));
        assert_eq!(image_list(&manifest), vec!["nginx:1.25"]);
    }
}

//! Chart values: defaults, subchart scoping and dependency conditions

use chartlift_core::Chart;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::gotemplate::value::deep_merge;

pub const VALUES_FILE: &str = "values.yaml";

/// Key shared by a chart and all of its subcharts
pub const GLOBAL_KEY: &str = "global";

/// Parse the chart's default values; a missing or empty file yields `{}`
pub fn default_values(chart: &Chart) -> Result<Value> {
    let Some(file) = chart.file(VALUES_FILE) else {
        return Ok(Value::Object(Map::new()));
    };
    let parsed: Option<Value> = serde_yaml::from_slice(&file.data)?;
    Ok(match parsed {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(values) => values,
    })
}

/// Values a subchart renders with
///
/// The subchart's own defaults are overridden by the parent's
/// `values.<key>` block, and the parent's `global` block is merged into the
/// subchart's `global`.
pub fn for_subchart(defaults: Value, parent: &Value, key: &str) -> Value {
    let mut values = match defaults {
        Value::Object(_) => defaults,
        _ => Value::Object(Map::new()),
    };

    if let Some(scoped) = parent.get(key).filter(|v| v.is_object()) {
        deep_merge(&mut values, scoped);
    }

    if let Some(global) = parent.get(GLOBAL_KEY).filter(|v| v.is_object()) {
        if let Value::Object(map) = &mut values {
            let slot = map
                .entry(GLOBAL_KEY.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            deep_merge(slot, global);
        }
    }

    values
}

/// Evaluate a dependency `condition` against the parent's values
///
/// The condition is a comma-separated list of dotted paths. The first path
/// that resolves to a boolean decides; when none does, the subchart is
/// enabled.
pub fn condition_enabled(condition: Option<&str>, parent: &Value) -> bool {
    let Some(condition) = condition else {
        return true;
    };

    for path in condition.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match lookup_path(parent, path) {
            Some(Value::Bool(enabled)) => return *enabled,
            Some(other) => {
                tracing::warn!(path, value = %other, "dependency condition is not a boolean, ignoring");
            }
            None => {}
        }
    }
    true
}

fn lookup_path<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(values, |current, key| current.as_object()?.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subchart_values_are_scoped() {
        let defaults = json!({"image": {"repository": "redis", "tag": "7.0"}, "port": 6379});
        let parent = json!({
            "image": {"repository": "nginx"},
            "redis": {"image": {"tag": "7.2"}},
            "global": {"imageRegistry": "quay.io"}
        });

        let values = for_subchart(defaults, &parent, "redis");
        assert_eq!(values["image"]["repository"], "redis");
        assert_eq!(values["image"]["tag"], "7.2");
        assert_eq!(values["port"], 6379);
        assert_eq!(values["global"]["imageRegistry"], "quay.io");
    }

    #[test]
    fn test_parent_global_overrides_subchart_global() {
        let defaults = json!({"global": {"imageRegistry": "docker.io", "pullPolicy": "Always"}});
        let parent = json!({"global": {"imageRegistry": "quay.io"}});

        let values = for_subchart(defaults, &parent, "redis");
        assert_eq!(
            values["global"],
            json!({"imageRegistry": "quay.io", "pullPolicy": "Always"})
        );
    }

    #[test]
    fn test_condition_first_boolean_path_decides() {
        let parent = json!({"redis": {"enabled": false}, "global": {"redis": {"enabled": true}}});

        assert!(condition_enabled(None, &parent));
        assert!(!condition_enabled(Some("redis.enabled"), &parent));
        assert!(condition_enabled(
            Some("missing.enabled, global.redis.enabled"),
            &parent
        ));
        assert!(!condition_enabled(
            Some("redis.enabled,global.redis.enabled"),
            &parent
        ));
        assert!(condition_enabled(Some("nothing.here"), &parent));
    }

    #[test]
    fn test_default_values_empty_file() {
        let chart = Chart::from_files(vec![
            chartlift_core::ChartFile::new(chartlift_core::CHART_FILE, "name: a\nversion: 1.0.0\n"),
            chartlift_core::ChartFile::new(VALUES_FILE, ""),
        ])
        .unwrap();
        assert_eq!(default_values(&chart).unwrap(), json!({}));
    }
}

//! Template tree walking and resource aggregation.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::annotation::extract_annotation;
use super::error::{ChartError, Result};
use super::values::{ChartValues, ValuesSource};

/// Extensions of files considered templates.
const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "tpl"];

/// How many times each resource identifier was found across a chart.
///
/// Serialises as a flat JSON object: `{"<resource-id>": <count>, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceOccurrences(BTreeMap<String, u64>);

impl ResourceOccurrences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `resource`.
    pub fn record(&mut self, resource: impl Into<String>) {
        *self.0.entry(resource.into()).or_insert(0) += 1;
    }

    /// Occurrences of `resource` (0 when never seen).
    pub fn get(&self, resource: &str) -> u64 {
        self.0.get(resource).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// JSON object form handed to the reporting side.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<S: Into<String>> FromIterator<S> for ResourceOccurrences {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut occurrences = Self::new();
        for resource in iter {
            occurrences.record(resource);
        }
        occurrences
    }
}

/// Scan every template under `<chart_root>/templates` for `annotation_key`.
///
/// Per-file failures are logged and that file is skipped; only a missing
/// templates directory fails the walk.
pub fn walk_templates(chart_root: &Path, annotation_key: &str) -> Result<ResourceOccurrences> {
    walk_templates_with(chart_root, annotation_key, &ChartValues::new(chart_root))
}

/// [`walk_templates`] with an explicit values source.
pub fn walk_templates_with<V: ValuesSource + ?Sized>(
    chart_root: &Path,
    annotation_key: &str,
    values: &V,
) -> Result<ResourceOccurrences> {
    let templates_dir = chart_root.join("templates");
    if !templates_dir.is_dir() {
        return Err(ChartError::TemplatesDirMissing(templates_dir));
    }

    let mut occurrences = ResourceOccurrences::new();

    for entry in WalkDir::new(&templates_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("Error walking {}: {}", templates_dir.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_template(entry.path()) {
            continue;
        }

        match process_template_file(entry.path(), annotation_key, values) {
            Ok(resources) => {
                for resource in resources {
                    occurrences.record(resource);
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!("Skipping {}: {}", display_name(entry.path()), e)
            }
            Err(e) => error!("Error processing {}: {}", display_name(entry.path()), e),
        }
    }

    for (resource, count) in occurrences.iter() {
        debug!("Resource {}: {} occurrence(s)", resource, count);
    }

    Ok(occurrences)
}

/// Extract the annotated resources from one template file.
pub fn process_template_file<V: ValuesSource + ?Sized>(
    path: &Path,
    annotation_key: &str,
    values: &V,
) -> Result<Vec<String>> {
    // Templates may carry non-UTF-8 bytes
    let bytes = std::fs::read(path).map_err(|e| ChartError::filesystem(path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    debug!("Processing {}", display_name(path));

    let resources = extract_annotation(&content, annotation_key, values)?.unwrap_or_default();
    if !resources.is_empty() {
        info!(
            "Found finops resources in {}: {}",
            display_name(path),
            resources.join(", ")
        );
    }

    Ok(resources)
}

fn is_template(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Chart values loading and `{{ .Values.path }}` resolution.
//!
//! This is a dotted-path lookup, not a template engine: only a single
//! `.Values` path per expression is understood.

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use super::error::{ChartError, Result};

/// Values file names, in lookup order.
const VALUES_FILES: &[&str] = &["values.yaml", "values.yml"];

/// Parsed chart values. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesTree {
    root: Value,
}

impl ValuesTree {
    /// Parse values from YAML text. An empty document yields an empty mapping.
    pub fn parse(content: &str) -> Result<Self> {
        let root: Value =
            serde_yaml::from_str(content).map_err(|e| ChartError::ValuesMalformed(e.to_string()))?;
        match root {
            Value::Null => Ok(Self {
                root: Value::Mapping(serde_yaml::Mapping::new()),
            }),
            Value::Mapping(_) => Ok(Self { root }),
            other => Err(ChartError::ValuesMalformed(format!(
                "expected a mapping at the top level, found {}",
                kind_of(&other)
            ))),
        }
    }

    /// Root node of the tree.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Walk `segments` from the root.
    pub fn lookup<'a, I>(&self, segments: I) -> Result<&Value>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = &self.root;
        let mut walked = Vec::new();

        for segment in segments {
            let Value::Mapping(map) = current else {
                return Err(ChartError::TemplateInvalidPath(walked.join(".")));
            };
            walked.push(segment);
            current = map
                .get(Value::String(segment.to_string()))
                .ok_or_else(|| ChartError::TemplatePathNotFound(segment.to_string()))?;
        }

        Ok(current)
    }
}

/// Load `<chart_root>/values.yaml` (or `values.yml`).
pub fn load_values(chart_root: &Path) -> Result<ValuesTree> {
    let path = VALUES_FILES
        .iter()
        .map(|name| chart_root.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| ChartError::ValuesMissing(chart_root.to_path_buf()))?;

    let content = std::fs::read_to_string(&path).map_err(|e| ChartError::filesystem(&path, e))?;
    ValuesTree::parse(&content)
}

/// Something that can hand out a chart's values on demand.
pub trait ValuesSource {
    fn load(&self) -> Result<ValuesTree>;
}

/// Reads the values file from disk on every call.
#[derive(Debug, Clone)]
pub struct ChartValues {
    chart_root: PathBuf,
}

impl ChartValues {
    pub fn new(chart_root: impl Into<PathBuf>) -> Self {
        Self {
            chart_root: chart_root.into(),
        }
    }
}

impl ValuesSource for ChartValues {
    fn load(&self) -> Result<ValuesTree> {
        load_values(&self.chart_root)
    }
}

impl ValuesSource for ValuesTree {
    fn load(&self) -> Result<ValuesTree> {
        Ok(self.clone())
    }
}

/// Whether `text` carries a template expression.
pub fn is_templated(text: &str) -> bool {
    text.contains("{{") && text.contains("}}")
}

/// Resolve a `{{ .Values.a.b.c }}` expression against `values`.
///
/// Strings come back as-is, sequences and mappings JSON-encoded, other
/// scalars in their plain textual form.
pub fn resolve_expression(expr: &str, values: &ValuesTree) -> Result<String> {
    let mut clean = expr.trim();
    if let Some(inner) = clean.strip_prefix("{{").and_then(|s| s.strip_suffix("}}")) {
        clean = inner;
    }
    // Go template trim markers
    let clean = clean
        .trim()
        .trim_start_matches('-')
        .trim_end_matches('-')
        .trim();
    let path = clean.strip_prefix(".Values.").unwrap_or(clean);

    let segments: Vec<&str> = path
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(ChartError::TemplateInvalidPath(expr.trim().to_string()));
    }

    render(values.lookup(segments)?)
}

fn render(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        // Integral floats print without a fraction (`1.0` renders `1`)
        Value::Number(n) => Ok(match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        }),
        Value::Null => Ok("null".to_string()),
        Value::Sequence(_) | Value::Mapping(_) => {
            serde_json::to_string(value).map_err(|e| ChartError::ValuesMalformed(e.to_string()))
        }
        Value::Tagged(tagged) => render(&tagged.value),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn tree(yaml: &str) -> ValuesTree {
        ValuesTree::parse(yaml).unwrap()
    }

    #[test]
    fn test_resolve_nested_string() {
        let values = tree("a:\n  b: x\n");
        assert_eq!(resolve_expression("{{ .Values.a.b }}", &values).unwrap(), "x");
    }

    #[test]
    fn test_resolve_missing_key() {
        let values = tree("a:\n  b: x\n");
        let err = resolve_expression("{{ .Values.a.c }}", &values).unwrap_err();
        assert!(matches!(err, ChartError::TemplatePathNotFound(ref k) if k == "c"));
    }

    #[test]
    fn test_resolve_through_scalar_is_invalid_path() {
        let values = tree("a:\n  b: x\n");
        let err = resolve_expression("{{ .Values.a.b.c }}", &values).unwrap_err();
        assert!(matches!(err, ChartError::TemplateInvalidPath(_)));
    }

    #[test]
    fn test_resolve_list_as_json() {
        let values = tree("list:\n  - r1\n  - r2\n");
        assert_eq!(
            resolve_expression("{{ .Values.list }}", &values).unwrap(),
            r#"["r1","r2"]"#
        );
    }

    #[test]
    fn test_resolve_scalars() {
        let values = tree("replicas: 3\nenabled: true\nnothing: ~\n");
        assert_eq!(resolve_expression("{{ .Values.replicas }}", &values).unwrap(), "3");
        assert_eq!(resolve_expression("{{ .Values.enabled }}", &values).unwrap(), "true");
        assert_eq!(resolve_expression("{{ .Values.nothing }}", &values).unwrap(), "null");
    }

    #[test]
    fn test_resolve_floats() {
        let values = tree("size: 1.0\nratio: 0.25\n");
        assert_eq!(resolve_expression("{{ .Values.size }}", &values).unwrap(), "1");
        assert_eq!(resolve_expression("{{ .Values.ratio }}", &values).unwrap(), "0.25");
    }

    #[test]
    fn test_whitespace_between_segments() {
        let values = tree("a:\n  b: x\n");
        assert_eq!(resolve_expression("{{.Values. a . b}}", &values).unwrap(), "x");
        assert_eq!(resolve_expression("  {{- .Values.a.b -}}  ", &values).unwrap(), "x");
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let values = tree("a: 1\n");
        assert!(matches!(
            resolve_expression("{{ .Values. }}", &values),
            Err(ChartError::TemplateInvalidPath(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        assert!(matches!(
            ValuesTree::parse("- a\n- b\n"),
            Err(ChartError::ValuesMalformed(_))
        ));
        assert!(ValuesTree::parse("").is_ok());
    }

    #[test]
    fn test_load_values_missing_and_malformed() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_values(dir.path()),
            Err(ChartError::ValuesMissing(_))
        ));

        std::fs::write(dir.path().join("values.yaml"), "a: [unclosed\n").unwrap();
        assert!(matches!(
            load_values(dir.path()),
            Err(ChartError::ValuesMalformed(_))
        ));
    }

    #[test]
    fn test_chart_values_reads_from_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("values.yml"), "finops:\n  tag: cost\n").unwrap();
        let values = ChartValues::new(dir.path()).load().unwrap();
        assert_eq!(resolve_expression("{{ .Values.finops.tag }}", &values).unwrap(), "cost");
    }

    #[test]
    fn test_is_templated() {
        assert!(is_templated("{{ .Values.x }}"));
        assert!(!is_templated("plain"));
        assert!(!is_templated("{{ half"));
    }

    proptest! {
        #[test]
        fn resolves_any_two_level_path(
            outer in "k[a-zA-Z0-9_]{0,8}",
            inner in "v[a-zA-Z0-9_]{0,8}",
            leaf in "[a-zA-Z0-9-]{1,16}",
        ) {
            let yaml = format!("{outer}:\n  {inner}: \"{leaf}\"\n");
            let values = ValuesTree::parse(&yaml).unwrap();
            let expr = format!("{{{{ .Values.{outer}.{inner} }}}}");
            prop_assert_eq!(resolve_expression(&expr, &values).unwrap(), leaf);
        }
    }
}

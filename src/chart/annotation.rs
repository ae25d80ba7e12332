//! FinOps annotation extraction from raw template text.
//!
//! Templates are not valid YAML until rendered, so this is a line scan: the
//! first line containing the annotation key is split on its first `:` and the
//! remainder is read as a JSON array of resource identifiers. Values may be
//! literal arrays, arrays with templated elements, or a single template
//! expression that evaluates to an array.

use log::warn;

use super::error::{ChartError, Result};
use super::values::{ValuesSource, ValuesTree, is_templated, resolve_expression};

/// Extract the resource identifiers carried by `annotation_key` in `content`.
///
/// Returns `Ok(None)` when the key does not appear (most templates).
/// Template resolution problems are logged and leave the raw text in place;
/// only a value that still is not a JSON string array is an error. A JSON
/// `null` value carries no resources.
pub fn extract_annotation<V: ValuesSource + ?Sized>(
    content: &str,
    annotation_key: &str,
    values: &V,
) -> Result<Option<Vec<String>>> {
    if annotation_key.is_empty() || !content.contains(annotation_key) {
        return Ok(None);
    }

    let Some(raw) = content
        .lines()
        .filter(|line| line.contains(annotation_key))
        .find_map(|line| line.split_once(':').map(|(_, value)| value))
    else {
        return Ok(None);
    };

    let value = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    let mut lazy = LazyValues::new(values);

    if let Ok(parsed) = serde_json::from_str::<Option<Vec<String>>>(value) {
        let mut resources = parsed.unwrap_or_default();
        for resource in resources.iter_mut().filter(|r| is_templated(r)) {
            if let Some(resolved) = lazy.resolve(resource) {
                *resource = resolved;
            }
        }
        return Ok(Some(resources));
    }

    let resolved = if is_templated(value) {
        lazy.resolve(value).unwrap_or_else(|| value.to_string())
    } else {
        value.to_string()
    };

    serde_json::from_str::<Option<Vec<String>>>(&resolved)
        .map(|parsed| Some(parsed.unwrap_or_default()))
        .map_err(|e| ChartError::AnnotationMalformed {
            value: resolved,
            reason: e.to_string(),
        })
}

/// Loads values at most once, and only when an expression needs them.
struct LazyValues<'a, V: ?Sized> {
    source: &'a V,
    loaded: Option<std::result::Result<ValuesTree, String>>,
}

impl<'a, V: ValuesSource + ?Sized> LazyValues<'a, V> {
    fn new(source: &'a V) -> Self {
        Self {
            source,
            loaded: None,
        }
    }

    /// Resolve `expr`, logging and returning `None` on any failure.
    fn resolve(&mut self, expr: &str) -> Option<String> {
        let source = self.source;
        let values = match self
            .loaded
            .get_or_insert_with(|| source.load().map_err(|e| e.to_string()))
        {
            Ok(values) => values,
            Err(e) => {
                warn!("Failed to load values, using template as-is: {}", e);
                return None;
            }
        };

        match resolve_expression(expr, values) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                warn!("Failed to resolve '{}', using template as-is: {}", expr, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const KEY: &str = "krateo-finops-focus-resource";

    fn values(yaml: &str) -> ValuesTree {
        ValuesTree::parse(yaml).unwrap()
    }

    /// Counts how often values are requested.
    struct CountingValues {
        tree: ValuesTree,
        loads: Cell<usize>,
    }

    impl ValuesSource for CountingValues {
        fn load(&self) -> Result<ValuesTree> {
            self.loads.set(self.loads.get() + 1);
            Ok(self.tree.clone())
        }
    }

    struct MissingValues;

    impl ValuesSource for MissingValues {
        fn load(&self) -> Result<ValuesTree> {
            Err(ChartError::ValuesMissing("/nowhere".into()))
        }
    }

    #[test]
    fn test_absent_key() {
        let content = "apiVersion: v1\nkind: Service\n";
        assert_eq!(extract_annotation(content, KEY, &MissingValues).unwrap(), None);
    }

    #[test]
    fn test_literal_array() {
        let content = r#"annotation: ["svc-a","svc-b"]"#;
        assert_eq!(
            extract_annotation(content, "annotation", &MissingValues).unwrap(),
            Some(vec!["svc-a".to_string(), "svc-b".to_string()])
        );
    }

    #[test]
    fn test_quoted_array_in_manifest() {
        let content = format!(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  annotations:\n    {KEY}: '[\"Virtual Machines\", \"Storage\"]'\n"
        );
        assert_eq!(
            extract_annotation(&content, KEY, &MissingValues).unwrap(),
            Some(vec!["Virtual Machines".to_string(), "Storage".to_string()])
        );
    }

    #[test]
    fn test_templated_elements_resolve() {
        let content = format!(r#"    {KEY}: ["{{{{ .Values.finops.vm }}}}", "static"]"#);
        let tree = values("finops:\n  vm: Standard_B1s\n");
        assert_eq!(
            extract_annotation(&content, KEY, &tree).unwrap(),
            Some(vec!["Standard_B1s".to_string(), "static".to_string()])
        );
    }

    #[test]
    fn test_unresolvable_element_kept_verbatim() {
        let content = format!(r#"{KEY}: ["{{{{ .Values.missing }}}}"]"#);
        let tree = values("finops: {}\n");
        assert_eq!(
            extract_annotation(&content, KEY, &tree).unwrap(),
            Some(vec!["{{ .Values.missing }}".to_string()])
        );
    }

    #[test]
    fn test_whole_value_template() {
        let content = format!("{KEY}: \"{{{{ .Values.finops.resources }}}}\"\n");
        let tree = values("finops:\n  resources:\n    - r1\n    - r2\n");
        assert_eq!(
            extract_annotation(&content, KEY, &tree).unwrap(),
            Some(vec!["r1".to_string(), "r2".to_string()])
        );
    }

    #[test]
    fn test_whole_value_template_resolving_to_scalar_is_malformed() {
        let content = format!("{KEY}: {{{{ .Values.name }}}}\n");
        let tree = values("name: plain\n");
        let err = extract_annotation(&content, KEY, &tree).unwrap_err();
        assert!(matches!(err, ChartError::AnnotationMalformed { ref value, .. } if value == "plain"));
    }

    #[test]
    fn test_garbage_value_is_malformed() {
        let content = format!("{KEY}: not-json\n");
        assert!(matches!(
            extract_annotation(&content, KEY, &MissingValues),
            Err(ChartError::AnnotationMalformed { .. })
        ));
    }

    #[test]
    fn test_null_value_carries_nothing() {
        let literal = format!("{KEY}: null\n");
        assert_eq!(
            extract_annotation(&literal, KEY, &MissingValues).unwrap(),
            Some(vec![])
        );

        let templated = format!("{KEY}: \"{{{{ .Values.finops.resources }}}}\"\n");
        let tree = values("finops:\n  resources: null\n");
        assert_eq!(extract_annotation(&templated, KEY, &tree).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_first_matching_line_wins() {
        let content = format!("{KEY}: [\"first\"]\n{KEY}: [\"second\"]\n");
        assert_eq!(
            extract_annotation(&content, KEY, &MissingValues).unwrap(),
            Some(vec!["first".to_string()])
        );
    }

    #[test]
    fn test_values_loaded_once_and_only_when_needed() {
        let source = CountingValues {
            tree: values("a: x\nb: y\n"),
            loads: Cell::new(0),
        };

        let literal = format!(r#"{KEY}: ["plain"]"#);
        extract_annotation(&literal, KEY, &source).unwrap();
        assert_eq!(source.loads.get(), 0);

        let templated = format!(r#"{KEY}: ["{{{{ .Values.a }}}}", "{{{{ .Values.b }}}}"]"#);
        let resources = extract_annotation(&templated, KEY, &source).unwrap();
        assert_eq!(resources, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(source.loads.get(), 1);
    }
}

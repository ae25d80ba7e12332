//! Cluster object shapes used by the parser.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{KubeError, Result};

/// Points at one namespaced object of an arbitrary kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    /// Plural resource name, e.g. `compositiondefinitions`.
    pub resource: String,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}/{}",
            self.api_version, self.resource, self.namespace, self.name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamespacedName {
    pub name: String,
    pub namespace: String,
}

/// One key of a Secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

/// `finops.krateo.io/v1` DatabaseConfig.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub spec: DatabaseConfigSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfigSpec {
    pub username: String,
    pub password_secret_ref: SecretKeySelector,
}

/// `core.krateo.io` CompositionDefinition, reduced to the chart it points at.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositionDefinition {
    pub spec: CompositionDefinitionSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompositionDefinitionSpec {
    pub chart: ChartInfo,
}

/// Chart location as declared on a CompositionDefinition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub url: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "insecureSkipVerifyTLS")]
    pub insecure_skip_verify_tls: bool,
    #[serde(default)]
    pub credentials: Option<ChartCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartCredentials {
    pub username: String,
    pub password_ref: SecretKeySelector,
}

/// Pluralizer response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluralNames {
    pub plural: String,
    #[serde(default)]
    pub singular: String,
    #[serde(default)]
    pub shorts: Vec<String>,
}

/// Split `group/version` (or a bare core `version`) into its parts.
pub fn split_api_version(api_version: &str) -> Result<(&str, &str)> {
    let api_version = api_version.trim();
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };

    if version.is_empty() || version.contains('/') || (api_version.contains('/') && group.is_empty()) {
        return Err(KubeError::InvalidApiVersion(api_version.to_string()));
    }
    Ok((group, version))
}

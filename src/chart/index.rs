//! Helm repository `index.yaml` parsing.

use std::collections::HashMap;

use serde::Deserialize;

use super::error::{ChartError, Result};

/// Parsed repository index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryIndex {
    #[serde(default)]
    pub entries: HashMap<String, Vec<IndexEntry>>,
}

/// A single chart release listed in the index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl RepositoryIndex {
    /// Parse `index.yaml` content.
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ChartError::MalformedIndex(e.to_string()))
    }

    /// Find the entry for `name` whose `appVersion` equals `version` exactly.
    ///
    /// The first match wins when the index lists duplicates.
    pub fn find(&self, name: &str, version: &str) -> Result<&IndexEntry> {
        self.entries
            .get(name)
            .and_then(|releases| releases.iter().find(|e| e.app_version == version))
            .ok_or_else(|| ChartError::RepositoryEntryNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }
}

impl IndexEntry {
    /// Tarball location for this entry, resolved against the index base URL.
    pub fn tarball_url(&self, base_url: &str) -> Result<String> {
        let first = self
            .urls
            .first()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ChartError::MalformedIndex(format!(
                    "entry with appVersion '{}' has no urls",
                    self.app_version
                ))
            })?;

        if first.starts_with("http://") || first.starts_with("https://") {
            return Ok(first.to_string());
        }

        Ok(format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            first.trim_start_matches('/')
        ))
    }
}

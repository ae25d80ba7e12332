//! Chart references.
//!
//! A [`ChartReference`] identifies exactly one chart archive. It is built once
//! from the triggering CompositionDefinition and never mutated afterwards.

use super::error::{ChartError, Result};

/// Basic-auth credentials for a chart repository or registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Identifies one chart to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartReference {
    /// Tarball URL, repository base URL or `oci://` reference.
    pub uri: String,
    /// Chart name inside a repository index.
    pub repository_name: Option<String>,
    /// Chart version (index `appVersion` or OCI tag).
    pub version: Option<String>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls: bool,
    pub credentials: Option<Credentials>,
}

impl ChartReference {
    /// Create a reference to the given URI with no other options set.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            repository_name: None,
            version: None,
            insecure_skip_tls: false,
            credentials: None,
        }
    }

    pub fn with_repository(mut self, name: impl Into<String>) -> Self {
        self.repository_name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn insecure_skip_tls(mut self, insecure: bool) -> Self {
        self.insecure_skip_tls = insecure;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Trimmed URI, or `ReferenceInvalid` if empty.
    pub fn validated_uri(&self) -> Result<&str> {
        let uri = self.uri.trim();
        if uri.is_empty() {
            return Err(ChartError::ReferenceInvalid(
                "chart URI cannot be empty".to_string(),
            ));
        }
        Ok(uri)
    }

    /// Non-empty version, if any.
    pub fn version(&self) -> Option<&str> {
        non_empty(self.version.as_deref())
    }

    /// Non-empty repository name, if any.
    pub fn repository_name(&self) -> Option<&str> {
        non_empty(self.repository_name.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

//! Error types for chart acquisition and annotation extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while fetching, unpacking or scanning a Helm chart.
#[derive(Debug, Error)]
pub enum ChartError {
    /// The chart reference is missing or cannot be used for any strategy.
    #[error("invalid chart reference: {0}")]
    ReferenceInvalid(String),

    /// The secret holding the chart credentials could not be read.
    #[error("chart credentials unavailable: {0}")]
    SecretUnavailable(String),

    /// The repository index has no entry for the requested chart/version.
    #[error("chart '{name}' with appVersion '{version}' not found in repository index")]
    RepositoryEntryNotFound { name: String, version: String },

    /// The remote answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    TransportFailure { url: String, status: u16 },

    /// Network-level failure (connect, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// `index.yaml` could not be parsed.
    #[error("malformed repository index: {0}")]
    MalformedIndex(String),

    /// OCI registry answered with something we cannot use.
    #[error("OCI registry error: {0}")]
    Registry(String),

    /// The gzip or tar stream is invalid.
    #[error("chart archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    /// An archive entry would land outside the extraction directory.
    #[error("archive entry '{0}' escapes the extraction directory")]
    UnsafeArchivePath(String),

    /// Reading or writing the local filesystem failed.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("values file not found in {0}")]
    ValuesMissing(PathBuf),

    #[error("values file is malformed: {0}")]
    ValuesMalformed(String),

    /// A `.Values` path segment does not exist.
    #[error("key '{0}' not found in values")]
    TemplatePathNotFound(String),

    /// A `.Values` path walks through a non-mapping node, or is empty.
    #[error("invalid values path '{0}'")]
    TemplateInvalidPath(String),

    #[error("malformed annotation value '{value}': {reason}")]
    AnnotationMalformed { value: String, reason: String },

    #[error("templates directory not found at {0}")]
    TemplatesDirMissing(PathBuf),

    /// The blocking extraction task was cancelled or panicked.
    #[error("chart processing interrupted: {0}")]
    Interrupted(String),
}

impl ChartError {
    /// Wrap an I/O error with the path it happened on.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Errors that only affect a single template file and never abort a walk.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValuesMissing(_)
                | Self::ValuesMalformed(_)
                | Self::TemplatePathNotFound(_)
                | Self::TemplateInvalidPath(_)
                | Self::AnnotationMalformed { .. }
        )
    }
}

/// Result type alias for chart operations.
pub type Result<T> = std::result::Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(ChartError::TemplatePathNotFound("a".into()).is_recoverable());
        assert!(
            ChartError::AnnotationMalformed {
                value: "x".into(),
                reason: "y".into()
            }
            .is_recoverable()
        );
        assert!(!ChartError::TemplatesDirMissing(PathBuf::from("/tmp")).is_recoverable());
        assert!(!ChartError::ReferenceInvalid("empty".into()).is_recoverable());
    }

    #[test]
    fn test_transport_failure_message() {
        let err = ChartError::TransportFailure {
            url: "https://charts.example.com/index.yaml".into(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "request to https://charts.example.com/index.yaml failed with status 404"
        );
    }
}

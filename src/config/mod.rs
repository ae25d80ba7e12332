pub mod types;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

use crate::kube::NamespacedName;
pub use types::{Config, DatabaseConfigRef, LogLevel, Settings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Values that take precedence over the config file (environment and flags).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub notebook_url: Option<String>,
    pub database_config_name: Option<String>,
    pub database_config_namespace: Option<String>,
    pub annotation_table: Option<String>,
    pub annotation_label: Option<String>,
    pub pluralizer_url: Option<String>,
    pub log_level: Option<LogLevel>,
    pub work_dir: Option<PathBuf>,
    pub fetch_timeout_secs: Option<u64>,
    pub plain_http_registries: Option<bool>,
}

/// Load configuration from `path`, or defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

impl Config {
    /// Overlay every value set in `overrides`.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(url) = overrides.notebook_url {
            self.notebook_url = Some(url);
        }
        if let Some(name) = overrides.database_config_name {
            self.database_config.name = Some(name);
        }
        if let Some(namespace) = overrides.database_config_namespace {
            self.database_config.namespace = Some(namespace);
        }
        if let Some(table) = overrides.annotation_table {
            self.annotation_table = table;
        }
        if let Some(label) = overrides.annotation_label {
            self.annotation_label = label;
        }
        if let Some(url) = overrides.pluralizer_url {
            self.pluralizer_url = Some(url);
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(dir) = overrides.work_dir {
            self.work_dir = Some(dir);
        }
        if let Some(secs) = overrides.fetch_timeout_secs {
            self.fetch_timeout_secs = secs;
        }
        if let Some(plain_http) = overrides.plain_http_registries {
            self.plain_http_registries = plain_http;
        }
    }

    /// Check required values and resolve defaults.
    pub fn validate(self) -> Result<Settings> {
        let notebook_url = required(self.notebook_url, "notebook_url")?;
        let name = required(self.database_config.name, "database_config.name")?;
        let namespace = required(self.database_config.namespace, "database_config.namespace")?;

        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        let annotation_table = non_empty_or_default(
            self.annotation_table,
            types::DEFAULT_ANNOTATION_TABLE,
            "annotation table",
        );
        let annotation_label = non_empty_or_default(
            self.annotation_label,
            types::DEFAULT_ANNOTATION_LABEL,
            "annotation label",
        );

        Ok(Settings {
            port: self.port,
            notebook_url,
            database_config: NamespacedName { name, namespace },
            annotation_table,
            annotation_label,
            pluralizer_url: self.pluralizer_url.filter(|u| !u.trim().is_empty()),
            log_level: self.log_level,
            work_dir: self.work_dir.unwrap_or_else(std::env::temp_dir),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            plain_http_registries: self.plain_http_registries,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn non_empty_or_default(value: String, default: &str, what: &str) -> String {
    if value.trim().is_empty() {
        warn!("{} is empty, using default value '{}'", what, default);
        default.to_string()
    } else {
        value
    }
}

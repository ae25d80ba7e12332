use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::kube::NamespacedName;

pub const DEFAULT_PORT: u16 = 8085;
pub const DEFAULT_ANNOTATION_TABLE: &str = "composition_definition_annotations";
pub const DEFAULT_ANNOTATION_LABEL: &str = "krateo-finops-focus-resource";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Configuration as read from file and environment, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Database handler notebook endpoint
    pub notebook_url: Option<String>,
    pub database_config: DatabaseConfigRef,
    pub annotation_table: String,
    pub annotation_label: String,
    /// Pluralizer endpoint; naive pluralisation when unset
    pub pluralizer_url: Option<String>,
    pub log_level: LogLevel,
    /// Parent directory for chart extraction; system temp dir when unset
    pub work_dir: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    /// Reach OCI registries over plain HTTP
    pub plain_http_registries: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            notebook_url: None,
            database_config: DatabaseConfigRef::default(),
            annotation_table: DEFAULT_ANNOTATION_TABLE.to_string(),
            annotation_label: DEFAULT_ANNOTATION_LABEL.to_string(),
            pluralizer_url: None,
            log_level: LogLevel::default(),
            work_dir: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            plain_http_registries: false,
        }
    }
}

/// Name and namespace of the DatabaseConfig object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfigRef {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

/// Log verbosity selectable through `DEBUG_LEVEL`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Error,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Error => log::LevelFilter::Error,
        }
    }
}

/// Validated runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub notebook_url: String,
    pub database_config: NamespacedName,
    pub annotation_table: String,
    pub annotation_label: String,
    pub pluralizer_url: Option<String>,
    pub log_level: LogLevel,
    pub work_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub plain_http_registries: bool,
}

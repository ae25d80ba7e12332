use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigOverrides, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "finops-cd-parser")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract FinOps annotations from CompositionDefinition Helm charts")]
#[command(long_about = "Listens for CompositionDefinition events, downloads the referenced Helm chart, counts the resources declared by the FinOps annotation in its templates and stores the result through the database handler notebook.")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "FINOPS_CD_PARSER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "PORT_FINOPS_COMPOSITION_DEFINITION_PARSER")]
    pub port: Option<u16>,

    /// Database handler notebook endpoint
    #[arg(long, value_name = "URL", env = "URL_DATABASE_HANDLER_PRICING_NOTEBOOK")]
    pub notebook_url: Option<String>,

    /// Name of the DatabaseConfig holding the notebook credentials
    #[arg(long, env = "DATABASE_CONFIG_NAME")]
    pub database_config_name: Option<String>,

    /// Namespace of the DatabaseConfig
    #[arg(long, env = "DATABASE_CONFIG_NAMESPACE")]
    pub database_config_namespace: Option<String>,

    /// Table the notebook writes annotations to
    #[arg(long, env = "ANNOTATION_TABLE")]
    pub annotation_table: Option<String>,

    /// Annotation key scanned for in chart templates
    #[arg(long, env = "ANNOTATION_LABEL")]
    pub annotation_label: Option<String>,

    /// Pluralizer endpoint
    #[arg(long, value_name = "URL", env = "URL_PLURALS")]
    pub pluralizer_url: Option<String>,

    /// Log level
    #[arg(long, value_enum, ignore_case = true, env = "DEBUG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Directory charts are extracted under
    #[arg(long, value_name = "DIR", env = "CHART_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Timeout for chart and notebook requests, in seconds
    #[arg(long, value_name = "SECS", env = "CHART_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    /// Reach OCI registries over plain HTTP
    #[arg(long, env = "OCI_PLAIN_HTTP")]
    pub plain_http_registries: bool,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Values from flags and environment, layered over the config file.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            notebook_url: self.notebook_url.clone(),
            database_config_name: self.database_config_name.clone(),
            database_config_namespace: self.database_config_namespace.clone(),
            annotation_table: self.annotation_table.clone(),
            annotation_label: self.annotation_label.clone(),
            pluralizer_url: self.pluralizer_url.clone(),
            log_level: self.log_level,
            work_dir: self.work_dir.clone(),
            fetch_timeout_secs: self.fetch_timeout_secs,
            plain_http_registries: self.plain_http_registries.then_some(true),
        }
    }

    /// Effective log filter: `-v` flags win over the configured level.
    pub fn log_filter(&self, configured: LogLevel) -> log::LevelFilter {
        match self.verbose {
            0 => configured.filter(),
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    pub fn init_logging(&self, configured: LogLevel) {
        if self.quiet {
            return;
        }

        env_logger::Builder::from_default_env()
            .filter_level(self.log_filter(configured))
            .init();
    }
}

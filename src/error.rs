use thiserror::Error;

use crate::chart::ChartError;
use crate::config::ConfigError;
use crate::kube::KubeError;
use crate::notebook::NotebookError;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Chart processing failed: {0}")]
    Chart(#[from] ChartError),

    #[error("Cluster access failed: {0}")]
    Kube(#[from] KubeError),

    #[error("Notebook call failed: {0}")]
    Notebook(#[from] NotebookError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

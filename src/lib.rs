//! # FinOps CompositionDefinition parser
//!
//! Webhook service that reacts to Krateo CompositionDefinition events. For each
//! created definition it downloads the referenced Helm chart, scans the chart
//! templates for the FinOps annotation and reports how many times every listed
//! resource appears. Deleted definitions have their entries removed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use finops_cd_parser::chart::{self, ChartFetcher, ChartReference};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = ChartFetcher::new(Duration::from_secs(60))?;
//! let reference = ChartReference::new(
//!     "https://github.com/krateoplatformops/krateo-v2-template-fireworksapp/releases/download/0.1.0/fireworks-app-0.1.0.tgz",
//! );
//! let dir = tempfile::tempdir()?;
//! let occurrences = chart::run(&fetcher, &reference, dir.path(), "krateo-finops-focus-resource").await?;
//! for (resource, count) in occurrences.iter() {
//!     println!("{resource}: {count}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod chart;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod kube;
pub mod notebook;
pub mod server;

pub use chart::{ChartError, ChartReference, ResourceOccurrences};
pub use error::{ParserError, Result};
pub use handlers::{DispatchOutcome, EventDispatcher};

use crate::chart::ChartFetcher;
use crate::config::Settings;
use crate::handlers::DispatchSettings;
use crate::kube::{KubeClient, Pluralizer};
use crate::notebook::NotebookClient;
use crate::server::{ParserServer, ServerConfig};

/// The current version of the service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire up the cluster client, chart fetcher and notebook client, then
/// serve until shutdown.
pub async fn run_server(settings: Settings) -> Result<()> {
    let cluster = KubeClient::infer().await?;
    let fetcher = ChartFetcher::new(settings.fetch_timeout)?
        .with_plain_http_registries(settings.plain_http_registries);
    let notebook = NotebookClient::new(
        settings.notebook_url.clone(),
        settings.annotation_table.clone(),
        settings.fetch_timeout,
    )?;
    let pluralizer = Pluralizer::new(settings.pluralizer_url.clone(), settings.fetch_timeout)?;

    let dispatcher = EventDispatcher::new(
        cluster,
        notebook,
        fetcher,
        pluralizer,
        DispatchSettings {
            annotation_key: settings.annotation_label.clone(),
            database_config: settings.database_config.clone(),
            work_dir: settings.work_dir.clone(),
        },
    );

    let server = ParserServer::new(ServerConfig::default().port(settings.port), dispatcher);
    log::info!("Starting finops-cd-parser {} on {}", VERSION, server.addr());
    server.run().await?;
    Ok(())
}

//! Helm chart acquisition and FinOps annotation extraction.
//!
//! A chart is resolved from a [`ChartReference`] (tarball URL, repository
//! index or OCI registry), unpacked into a caller-owned work directory, and
//! its templates are scanned for an annotation that lists the resources to
//! track. The result is a [`ResourceOccurrences`] count per resource id.
//!
//! ```rust,no_run
//! use finops_cd_parser::chart::{self, ChartFetcher, ChartReference};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = ChartFetcher::new(Duration::from_secs(60))?;
//! let reference = ChartReference::new("https://charts.krateo.io")
//!     .with_repository("fireworks-app")
//!     .with_version("1.1.13");
//! let work_dir = tempfile::tempdir()?;
//! let occurrences =
//!     chart::run(&fetcher, &reference, work_dir.path(), "krateo-finops-focus-resource").await?;
//! println!("{}", occurrences.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod archive;
pub mod error;
pub mod index;
mod oci;
pub mod pipeline;
pub mod reference;
pub mod source;
pub mod values;
pub mod walker;

pub use annotation::extract_annotation;
pub use archive::{extract_archive, locate_chart_root};
pub use error::{ChartError, Result};
pub use index::{IndexEntry, RepositoryIndex};
pub use pipeline::run;
pub use reference::{ChartReference, Credentials};
pub use source::{ChartFetcher, ChartSource, SourceKind};
pub use values::{ChartValues, ValuesSource, ValuesTree, load_values, resolve_expression};
pub use walker::{ResourceOccurrences, walk_templates};

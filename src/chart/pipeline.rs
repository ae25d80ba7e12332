//! Chart pipeline: resolve, extract, walk.

use std::path::Path;

use log::{debug, info};

use super::archive::{extract_archive, locate_chart_root};
use super::error::{ChartError, Result};
use super::reference::ChartReference;
use super::source::ChartSource;
use super::walker::{ResourceOccurrences, walk_templates};

/// Fetch the chart behind `reference`, unpack it into `work_dir` and count
/// the resources carried by `annotation_key` across its templates.
///
/// Steps run strictly in order and the first failure is returned unchanged.
/// `work_dir` belongs to the caller, who must make it unique per run and
/// remove it afterwards.
pub async fn run<S: ChartSource>(
    source: &S,
    reference: &ChartReference,
    work_dir: &Path,
    annotation_key: &str,
) -> Result<ResourceOccurrences> {
    let tarball = source.fetch(reference).await?;
    info!(
        "Downloaded chart {} ({} bytes), extracting to {}",
        reference.uri,
        tarball.len(),
        work_dir.display()
    );

    let dest = work_dir.to_path_buf();
    let hint = reference.repository_name().map(str::to_string);
    let key = annotation_key.to_string();

    // archive and template I/O is blocking
    let occurrences = tokio::task::spawn_blocking(move || scan(&tarball, &dest, hint.as_deref(), &key))
        .await
        .map_err(|e| ChartError::Interrupted(e.to_string()))??;

    info!(
        "Chart {} yielded {} distinct resource(s)",
        reference.uri,
        occurrences.len()
    );
    Ok(occurrences)
}

/// Blocking half of [`run`]: extract then walk.
pub fn scan(
    tarball: &[u8],
    work_dir: &Path,
    hint: Option<&str>,
    annotation_key: &str,
) -> Result<ResourceOccurrences> {
    extract_archive(tarball, work_dir)?;
    let chart_root = locate_chart_root(work_dir, hint);
    debug!("Chart root is {}", chart_root.display());
    walk_templates(&chart_root, annotation_key)
}

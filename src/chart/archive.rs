//! Chart archive extraction.
//!
//! Unpacks a gzip-compressed tar into a destination directory. Entry paths are
//! validated before anything is written so no entry can land outside the
//! destination.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;
use tar::{Archive, EntryType};

use super::error::{ChartError, Result};

/// Mode applied to directories the archive does not describe itself.
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Extract `tarball` (gzip + tar) into `dest`.
///
/// Any decompression, validation or write failure aborts the extraction.
pub fn extract_archive(tarball: &[u8], dest: &Path) -> Result<()> {
    debug!("Extracting chart archive to {}", dest.display());
    fs::create_dir_all(dest).map_err(|e| ChartError::filesystem(dest, e))?;

    let mut archive = Archive::new(GzDecoder::new(tarball));
    let entries = archive.entries().map_err(corrupt)?;

    for entry in entries {
        let mut entry = entry.map_err(corrupt)?;
        let raw_path = entry.path().map_err(corrupt)?.into_owned();
        let target = safe_join(dest, &raw_path)?;
        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().ok();

        match entry_type {
            EntryType::Directory => {
                create_dir(&target)?;
                // owner must keep write access so the directory can be populated
                set_mode(&target, mode.unwrap_or(DEFAULT_DIR_MODE) | 0o700)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    create_dir(parent)?;
                }
                let mut file = File::create(&target).map_err(|e| ChartError::filesystem(&target, e))?;
                io::copy(&mut entry, &mut file).map_err(|e| match e.kind() {
                    io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => corrupt(e),
                    _ => ChartError::filesystem(&target, e),
                })?;
                if let Some(mode) = mode {
                    set_mode(&target, mode)?;
                }
            }
            // pax/gnu metadata is consumed by the tar reader
            EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName => {}
            other => {
                debug!("Skipping {:?} entry {}", other, raw_path.display());
            }
        }
    }

    debug!("Extraction to {} completed", dest.display());
    Ok(())
}

/// Join an archive entry path onto `dest`, refusing anything that would escape it.
///
/// Absolute paths, drive prefixes and `..` components are rejected outright
/// rather than normalised.
pub fn safe_join(dest: &Path, entry_path: &Path) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    let mut depth = 0usize;

    for component in entry_path.components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ChartError::UnsafeArchivePath(
                    entry_path.display().to_string(),
                ));
            }
        }
    }

    if depth == 0 {
        return Err(ChartError::UnsafeArchivePath(
            entry_path.display().to_string(),
        ));
    }

    Ok(target)
}

/// Locate the chart root inside an extraction directory.
///
/// Charts are normally packaged as `<name>/Chart.yaml`; `hint` (the repository
/// name) is tried before scanning child directories.
pub fn locate_chart_root(work_dir: &Path, hint: Option<&str>) -> PathBuf {
    if work_dir.join("Chart.yaml").is_file() {
        return work_dir.to_path_buf();
    }

    if let Some(hinted) = hint.map(|h| work_dir.join(h)).filter(|p| p.is_dir()) {
        return hinted;
    }

    let mut children: Vec<PathBuf> = fs::read_dir(work_dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    children.sort();

    children
        .into_iter()
        .find(|p| p.join("Chart.yaml").is_file())
        .unwrap_or_else(|| work_dir.to_path_buf())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| ChartError::filesystem(path, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| ChartError::filesystem(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn corrupt(e: io::Error) -> ChartError {
    ChartError::ArchiveCorrupt(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn build_tgz(files: &[(&str, &str, u32)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(EntryType::Regular);
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Build an archive whose single entry name bypasses tar's own path checks.
    fn build_raw_name_tgz(name: &str, content: &str) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extracts_files_and_dirs() {
        let tgz = build_tgz(&[
            ("demo/Chart.yaml", "name: demo\nversion: 0.1.0\n", 0o644),
            ("demo/templates/deploy.yaml", "kind: Deployment\n", 0o644),
        ]);
        let dir = TempDir::new().unwrap();

        extract_archive(&tgz, dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("demo/templates/deploy.yaml")).unwrap(),
            "kind: Deployment\n"
        );
        assert!(dir.path().join("demo/Chart.yaml").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_preserves_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tgz = build_tgz(&[("demo/run.sh", "#!/bin/sh\n", 0o750)]);
        let dir = TempDir::new().unwrap();
        extract_archive(&tgz, dir.path()).unwrap();

        let mode = fs::metadata(dir.path().join("demo/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let outer = TempDir::new().unwrap();
        let dest = outer.path().join("dest");
        let tgz = build_raw_name_tgz("../escaped.txt", "pwned");

        let err = extract_archive(&tgz, &dest).unwrap_err();

        assert!(matches!(err, ChartError::UnsafeArchivePath(_)));
        assert!(!outer.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_rejects_absolute_path() {
        let dir = TempDir::new().unwrap();
        let tgz = build_raw_name_tgz("/tmp/absolute.txt", "pwned");
        assert!(matches!(
            extract_archive(&tgz, dir.path()),
            Err(ChartError::UnsafeArchivePath(_))
        ));
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let err = extract_archive(b"definitely not gzip", dir.path()).unwrap_err();
        assert!(matches!(err, ChartError::ArchiveCorrupt(_)));
    }

    #[test]
    fn test_safe_join() {
        let dest = Path::new("/work");
        assert_eq!(
            safe_join(dest, Path::new("./chart/values.yaml")).unwrap(),
            PathBuf::from("/work/chart/values.yaml")
        );
        assert!(safe_join(dest, Path::new("chart/../../etc/passwd")).is_err());
        assert!(safe_join(dest, Path::new(".")).is_err());
    }

    #[test]
    fn test_locate_chart_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a-notes")).unwrap();
        fs::create_dir_all(dir.path().join("fireworks-app/templates")).unwrap();
        fs::write(dir.path().join("fireworks-app/Chart.yaml"), "name: fireworks-app\n").unwrap();

        assert_eq!(
            locate_chart_root(dir.path(), None),
            dir.path().join("fireworks-app")
        );
        assert_eq!(
            locate_chart_root(dir.path(), Some("a-notes")),
            dir.path().join("a-notes")
        );
    }

    #[test]
    fn test_locate_chart_root_flat_archive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Chart.yaml"), "name: flat\n").unwrap();
        assert_eq!(locate_chart_root(dir.path(), Some("flat")), dir.path());
    }
}

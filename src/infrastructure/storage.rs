use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::error::{AppError, Result};
use crate::shared::wait::poll_until;

/// Chrome writes downloads to `<name>.crdownload` and renames on completion.
const PARTIAL_DOWNLOAD_SUFFIX: &str = "crdownload";

/// Creates the download directory and returns its absolute path. Chrome
/// ignores relative download directories.
pub fn resolve_download_dir(dir: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(dir)?;
    fs::canonicalize(dir)
}

/// Removes a report left over from an earlier run so the browser does not
/// save the new one under a de-duplicated name.
pub fn remove_stale_report(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            warn!(path = %path.display(), "Removed stale report from a previous run");
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

pub fn remove_report(path: &Path) -> std::io::Result<()> {
    fs::remove_file(path)?;
    info!(path = %path.display(), "Removed local report");
    Ok(())
}

pub fn partial_download_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    path.with_file_name(name)
}

/// Waits until `path` exists, has no in-progress sibling, and its size did
/// not change between two consecutive polls.
pub async fn wait_for_download(path: &Path, timeout: Duration, interval: Duration) -> Result<u64> {
    let partial = partial_download_path(path);
    let mut last_size: Option<u64> = None;

    let size = poll_until(
        &format!("download of {}", path.display()),
        timeout,
        interval,
        || {
            let observed = if partial.exists() {
                None
            } else {
                fs::metadata(path).ok().map(|m| m.len())
            };
            let settled = match (observed, last_size) {
                (Some(now), Some(before)) if now == before && now > 0 => Some(now),
                _ => None,
            };
            last_size = observed;
            async move { Ok(settled) }
        },
    )
    .await?;

    info!(path = %path.display(), bytes = size, "Report downloaded");
    Ok(size)
}

/// Fails unless `path` is a readable, non-empty file.
pub fn ensure_report_present(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).map_err(|e| {
        AppError::NotFound(format!("Report file {}: {}", path.display(), e))
    })?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(AppError::NotFound(format!(
            "Report file {} is empty",
            path.display()
        )));
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

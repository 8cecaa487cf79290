//! Archive handling for the updater: download, extraction, backup rotation,
//! and cleanup of aged artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use walkdir::WalkDir;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(300);
const ARCHIVE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);
const BACKUP_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

fn is_xml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

/// Stream the archive to `update_dir/<filename>`, via a temp name so a
/// partial download never looks like a finished one.
pub async fn download(url: &str, update_dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(update_dir)?;
    let temp_path = update_dir.join(format!("temp_{filename}"));
    let final_path = update_dir.join(filename);

    info!("Downloading {}", url);
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()?;

    let total = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .with_context(|| format!("creating {}", temp_path.display()))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("reading download stream")?;
        file.write_all(&chunk).await?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);
    pb.finish_and_clear();

    fs::rename(&temp_path, &final_path)?;
    info!("Download complete: {}", final_path.display());
    Ok(final_path)
}

/// Extract into `update_dir/extracted_<stem>`, replacing any prior
/// extraction of the same archive.
pub fn extract(archive: &Path, update_dir: &Path) -> Result<PathBuf> {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let dest = update_dir.join(format!("extracted_{stem}"));

    if dest.exists() {
        fs::remove_dir_all(&dest)?;
    }
    fs::create_dir_all(&dest)?;

    info!("Extracting {}", archive.display());
    let file = fs::File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("reading zip archive")?;
    zip.extract(&dest).context("extracting zip archive")?;

    info!("Extracted to {}", dest.display());
    Ok(dest)
}

/// Copy the current XML files and version token aside before applying an
/// update.
pub fn backup(xml_dir: &Path, backup_dir: &Path, version_file: &Path) -> Result<()> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let dest = backup_dir.join(format!("backup_{timestamp}"));

    let xml_files: Vec<PathBuf> = WalkDir::new(xml_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_xml(e.path()))
        .map(|e| e.into_path())
        .collect();

    if xml_files.is_empty() {
        warn!("No XML files to back up");
        return Ok(());
    }

    fs::create_dir_all(&dest)?;
    for path in &xml_files {
        if let Some(name) = path.file_name() {
            fs::copy(path, dest.join(name))?;
        }
    }
    if version_file.exists() {
        if let Some(name) = version_file.file_name() {
            fs::copy(version_file, dest.join(name))?;
        }
    }

    info!("Backed up {} files to {}", xml_files.len(), dest.display());
    Ok(())
}

/// Copy extracted XML files into the source directory, preserving their
/// relative layout so per-region subdirectories survive.
pub fn apply(extracted: &Path, xml_dir: &Path) -> Result<usize> {
    let mut applied = 0usize;
    for entry in WalkDir::new(extracted).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !is_xml(entry.path()) {
            continue;
        }
        let relative = match entry.path().strip_prefix(extracted) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = xml_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)
            .with_context(|| format!("copying {}", entry.path().display()))?;
        applied += 1;
    }

    if applied == 0 {
        anyhow::bail!("update archive contains no XML files");
    }
    info!("Applied {} XML files to {}", applied, xml_dir.display());
    Ok(applied)
}

/// Drop downloads and extractions older than a week and backups older than a
/// month. Cleanup failures are logged, never fatal.
pub fn cleanup(update_dir: &Path, backup_dir: &Path) {
    let now = SystemTime::now();
    let older_than = |path: &Path, max_age: Duration| {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .map(|age| age > max_age)
            .unwrap_or(false)
    };

    for entry in WalkDir::new(update_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let stale_zip = entry.file_type().is_file()
            && name.to_lowercase().ends_with(".zip")
            && older_than(path, ARCHIVE_MAX_AGE);
        let stale_extraction = entry.file_type().is_dir()
            && name.starts_with("extracted_")
            && older_than(path, ARCHIVE_MAX_AGE);

        let result = if stale_zip {
            fs::remove_file(path)
        } else if stale_extraction {
            fs::remove_dir_all(path)
        } else {
            continue;
        };
        match result {
            Ok(()) => info!("Removed stale update artifact {}", name),
            Err(e) => warn!("Failed to remove {}: {}", name, e),
        }
    }

    for entry in WalkDir::new(backup_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("backup_") || !older_than(path, BACKUP_MAX_AGE) {
            continue;
        }
        let result = if entry.file_type().is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => info!("Removed old backup {}", name),
            Err(e) => warn!("Failed to remove {}: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn apply_preserves_region_subdirectories() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        fs::create_dir(src.path().join("01")).unwrap();
        let mut f = fs::File::create(src.path().join("01").join("AS_ADDR_OBJ.XML")).unwrap();
        f.write_all(b"<R/>").unwrap();
        let mut f = fs::File::create(src.path().join("version.txt")).unwrap();
        f.write_all(b"not xml").unwrap();

        let applied = apply(src.path(), dst.path()).unwrap();
        assert_eq!(applied, 1);
        assert!(dst.path().join("01").join("AS_ADDR_OBJ.XML").is_file());
        assert!(!dst.path().join("version.txt").exists());
    }

    #[test]
    fn apply_rejects_an_archive_without_xml() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        assert!(apply(src.path(), dst.path()).is_err());
    }
}

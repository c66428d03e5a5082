use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use tracing::info;

/// Timestamp suffix format for the safety rename of an overwritten live
/// file.
const PRE_RESTORE_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Materializes `backup_path`'s content at `destination`, decompressing
/// when the backup is an archive.
///
/// An existing file at `destination` is first renamed aside with a
/// `.pre-restore-<timestamp>` suffix, never deleted. Unlike the monitoring
/// side, failures here propagate to the caller for reporting.
pub async fn restore_backup(backup_path: &Path, destination: &Path) -> Result<()> {
    if !tokio::fs::try_exists(backup_path).await.unwrap_or(false) {
        bail!("backup file {} does not exist", backup_path.display());
    }

    if tokio::fs::try_exists(destination).await.unwrap_or(false) {
        let safety_path = pre_restore_path(destination);
        tokio::fs::rename(destination, &safety_path)
            .await
            .with_context(|| {
                format!("moving live file aside to {}", safety_path.display())
            })?;
        info!(
            "safety rename: {} -> {}",
            destination.display(),
            safety_path.display()
        );
    }

    let compressed = backup_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if compressed {
        extract_archive(backup_path, destination).await?;
    } else {
        tokio::fs::copy(backup_path, destination).await.with_context(|| {
            format!(
                "copying {} to {}",
                backup_path.display(),
                destination.display()
            )
        })?;
    }
    info!(
        "restored {} to {}",
        backup_path.display(),
        destination.display()
    );
    Ok(())
}

fn pre_restore_path(destination: &Path) -> PathBuf {
    let timestamp = Local::now().format(PRE_RESTORE_FORMAT);
    let mut renamed = destination.as_os_str().to_os_string();
    renamed.push(format!(".pre-restore-{timestamp}"));
    PathBuf::from(renamed)
}

/// Extracts the payload of a single-entry backup archive. Prefers the
/// entry named like the destination file; a destination renamed by the
/// caller falls back to the first entry.
async fn extract_archive(backup_path: &Path, destination: &Path) -> Result<()> {
    let backup_path = backup_path.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&backup_path)
            .with_context(|| format!("opening archive {}", backup_path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("reading archive {}", backup_path.display()))?;
        if archive.len() == 0 {
            bail!("archive {} has no entries", backup_path.display());
        }
        let mut output = std::fs::File::create(&destination)
            .with_context(|| format!("creating {}", destination.display()))?;
        let wanted = destination
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        let extracted = match wanted {
            Some(name) => match archive.by_name(&name) {
                Ok(mut entry) => {
                    std::io::copy(&mut entry, &mut output)
                        .context("extracting archive entry")?;
                    true
                }
                Err(zip::result::ZipError::FileNotFound) => false,
                Err(error) => return Err(error).context("opening archive entry"),
            },
            None => false,
        };
        if !extracted {
            let mut entry = archive.by_index(0).context("opening archive entry")?;
            std::io::copy(&mut entry, &mut output).context("extracting archive entry")?;
        }
        Ok(())
    })
    .await
    .context("restore task failed")?
}

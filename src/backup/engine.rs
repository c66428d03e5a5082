use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use super::fingerprint::Fingerprinter;
use super::naming::{BackupFormat, NamingCodec};
use super::prune::RetentionPruner;
use super::{notices, Event, EventSink};
use crate::utils::config::Config;

/// Orchestrates fingerprinting, backup creation and pruning for one pair
/// of saves/backup folders.
///
/// The engine exclusively owns the table of last-backed-up content hashes;
/// every mutation goes through `&mut self`, so the single worker task that
/// drives it serializes all `check_and_create_backup` calls and keeps the
/// table single-writer without locking.
pub struct BackupEngine {
    saves_folder: PathBuf,
    backup_folder: PathBuf,
    compress: bool,
    reconcile_throttle: Duration,
    codec: NamingCodec,
    fingerprinter: Fingerprinter,
    pruner: RetentionPruner,
    hashes: HashMap<String, String>,
    events: EventSink,
}

impl BackupEngine {
    pub fn new(config: &Config, events: EventSink) -> Self {
        let codec = NamingCodec::new(&config.save_extension);
        let pruner = RetentionPruner::new(
            config.backup_folder.clone(),
            config.retention_count,
            codec.clone(),
            events.clone(),
        );
        Self {
            saves_folder: config.saves_folder.clone(),
            backup_folder: config.backup_folder.clone(),
            compress: config.compress,
            reconcile_throttle: config.reconcile_throttle,
            codec,
            fingerprinter: Fingerprinter::new(config.hash_retries, config.hash_retry_delay),
            pruner,
            hashes: HashMap::new(),
            events,
        }
    }

    pub fn saves_folder(&self) -> &Path {
        &self.saves_folder
    }

    pub fn backup_folder(&self) -> &Path {
        &self.backup_folder
    }

    pub fn codec(&self) -> &NamingCodec {
        &self.codec
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub(crate) fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    pub(crate) fn reconcile_throttle(&self) -> Duration {
        self.reconcile_throttle
    }

    /// Whether a last-backup hash is known for this original filename.
    pub fn knows(&self, original: &str) -> bool {
        self.hashes.contains_key(original)
    }

    pub(crate) fn seed_hash(&mut self, original: String, digest: String) {
        self.hashes.insert(original, digest);
    }

    /// Backs up `path` if its content differs from the last backup taken.
    ///
    /// Never returns an error: every failure is converted to events so one
    /// bad cycle cannot take down monitoring.
    pub async fn check_and_create_backup(&mut self, path: &Path) {
        let Some(original) = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
        else {
            return;
        };

        let digest = match self.fingerprinter.digest(path).await {
            Ok(digest) => digest,
            Err(error) => {
                self.events.status(format!("Failed to read {original}: {error}"));
                self.events.notice(
                    notices::FILE_READ_FAILURE,
                    format!("Could not read {original}; skipping this backup cycle."),
                );
                return;
            }
        };

        if self.hashes.get(&original).map(String::as_str) == Some(digest.as_str()) {
            self.events
                .status(format!("Content of {original} unchanged. Skipping."));
            return;
        }

        match self.write_backup(path, &original, digest).await {
            Ok(_backup_filename) => {
                self.pruner.prune(&original).await;
            }
            Err(error) => {
                self.events
                    .status(format!("Error creating backup: {error:#}"));
                self.events.notice(
                    notices::BACKUP_ERROR,
                    format!("Could not back up {original}: {error:#}"),
                );
            }
        }
    }

    async fn write_backup(&mut self, path: &Path, original: &str, digest: String) -> Result<String> {
        tokio::fs::create_dir_all(&self.backup_folder)
            .await
            .with_context(|| format!("creating backup folder {}", self.backup_folder.display()))?;

        let format = if self.compress {
            BackupFormat::Zip
        } else {
            BackupFormat::Raw
        };
        let backup_filename = self
            .codec
            .encode(original, &Local::now().naive_local(), format);
        let destination = self.backup_folder.join(&backup_filename);

        match format {
            BackupFormat::Zip => write_archive(path, original, &destination).await?,
            BackupFormat::Raw => copy_preserving_mtime(path, &destination).await?,
        }

        let initial = self.hashes.insert(original.to_string(), digest).is_none();
        info!("created backup {backup_filename}");
        self.events
            .status(format!("Created backup: {backup_filename}"));
        self.events.emit(Event::BackupCreated {
            filename: backup_filename.clone(),
        });
        let title = if initial {
            notices::INITIAL_BACKUP_CREATED
        } else {
            notices::BACKUP_CREATED
        };
        self.events
            .notice(title, format!("Saved {original} as {backup_filename}."));
        Ok(backup_filename)
    }
}

/// Raw-mode backup: byte copy carrying over the source's modification
/// time, so backup ordering follows the save's write history.
async fn copy_preserving_mtime(source: &Path, destination: &Path) -> Result<()> {
    tokio::fs::copy(source, destination).await.with_context(|| {
        format!(
            "copying {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    if let Ok(modified) = std::fs::metadata(source).and_then(|meta| meta.modified()) {
        if let Ok(file) = std::fs::OpenOptions::new().write(true).open(destination) {
            let _ = file.set_modified(modified);
        }
    }
    Ok(())
}

/// Zip-mode backup: a single-entry deflate archive storing the payload
/// under the original filename, so a restore does not need the backup name.
async fn write_archive(source: &Path, entry_name: &str, destination: &Path) -> Result<()> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let entry_name = entry_name.to_string();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::create(&destination)
            .with_context(|| format!("creating archive {}", destination.display()))?;
        let mut archive = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        archive
            .start_file(entry_name.as_str(), options)
            .with_context(|| format!("starting archive entry {entry_name}"))?;
        let mut reader = std::io::BufReader::new(
            std::fs::File::open(&source)
                .with_context(|| format!("opening {}", source.display()))?,
        );
        std::io::copy(&mut reader, &mut archive)
            .with_context(|| format!("writing archive entry {entry_name}"))?;
        archive.finish().context("finalizing archive")?;
        Ok(())
    })
    .await
    .context("archive task failed")?
}

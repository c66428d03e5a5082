use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::naming::NamingCodec;
use super::{notices, Event, EventSink};

/// Bounds disk usage by deleting the oldest backups of one original file
/// beyond the configured retention count.
pub struct RetentionPruner {
    backup_folder: PathBuf,
    retention_count: usize,
    codec: NamingCodec,
    events: EventSink,
}

impl RetentionPruner {
    pub fn new(
        backup_folder: PathBuf,
        retention_count: usize,
        codec: NamingCodec,
        events: EventSink,
    ) -> Self {
        Self {
            backup_folder,
            retention_count,
            codec,
            events,
        }
    }

    /// Deletes the oldest backups for `original` if the retention limit is
    /// exceeded. Never returns an error: failures become events and the
    /// monitoring loop keeps running.
    pub async fn prune(&self, original: &str) {
        let backups = match self.collect_backups(original).await {
            Ok(backups) => backups,
            Err(error) => {
                warn!("could not list backups for {original}: {error}");
                self.events
                    .status(format!("Error pruning backups: {error}"));
                self.events.notice(
                    notices::PRUNE_ERROR,
                    format!("Could not list backups for {original}: {error}"),
                );
                return;
            }
        };
        if backups.len() <= self.retention_count {
            return;
        }
        let excess = backups.len() - self.retention_count;
        self.delete(&backups[..excess]).await;
    }

    /// All backups belonging to `original`, sorted oldest-first by
    /// modification time.
    pub(crate) async fn collect_backups(
        &self,
        original: &str,
    ) -> io::Result<Vec<(PathBuf, SystemTime)>> {
        let mut backups = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.backup_folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if self.codec.decode(name).as_deref() != Some(original) {
                continue;
            }
            // A file vanishing between listing and stat is benign.
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            backups.push((entry.path(), modified));
        }
        backups.sort_by_key(|(_, modified)| *modified);
        Ok(backups)
    }

    /// Deletes each target independently: one missing or undeletable file
    /// never stops the remaining deletions.
    pub(crate) async fn delete(&self, targets: &[(PathBuf, SystemTime)]) {
        for (path, _) in targets {
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!("pruned {filename}");
                    self.events
                        .status(format!("Pruned old backup: {filename}"));
                    self.events.emit(Event::BackupPruned { filename });
                }
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    self.events.notice(
                        notices::PRUNE_SKIPPED,
                        format!("{filename} was already gone; skipping."),
                    );
                }
                Err(error) => {
                    warn!("failed to prune {filename}: {error}");
                    self.events.notice(
                        notices::PRUNE_ERROR,
                        format!("Could not delete {filename}: {error}"),
                    );
                }
            }
        }
    }
}

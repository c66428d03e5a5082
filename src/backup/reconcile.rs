use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tracing::{debug, info};
use walkdir::WalkDir;

use super::engine::BackupEngine;

/// Startup pass, run once before the watcher attaches: seeds the engine's
/// hash table from the newest backup of each original file, then creates
/// first-time backups for saves that have none yet.
///
/// Checks `stop` before each file and aborts immediately when requested.
pub async fn run(engine: &mut BackupEngine, stop: &AtomicBool) {
    let backup_folder = engine.backup_folder().to_path_buf();
    if let Err(error) = tokio::fs::create_dir_all(&backup_folder).await {
        // The folder may live on a drive that is still mounting; keep
        // going so monitoring can pick it up once it appears.
        engine.events().status(format!(
            "Error preparing backup folder {}: {error}",
            backup_folder.display()
        ));
    }

    engine
        .events()
        .status("Initializing... scanning existing backups.");
    let latest = latest_backup_per_original(engine).await;
    match latest {
        Ok(latest) => {
            let fingerprinter = engine.fingerprinter().clone();
            for (original, path) in latest {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                match fingerprinter.digest(&path).await {
                    Ok(digest) => engine.seed_hash(original, digest),
                    // Unreadable backups simply do not seed; the next
                    // change event will create a fresh one.
                    Err(error) => debug!("skipping hash seed for {original}: {error}"),
                }
            }
        }
        Err(error) => {
            engine
                .events()
                .status(format!("Error scanning existing backups: {error}"));
        }
    }

    engine
        .events()
        .status("Checking for save files that need an initial backup...");
    let throttle = engine.reconcile_throttle();
    for path in snapshot_live_saves(engine) {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if engine.knows(name) {
            continue;
        }
        info!("no backup found for {name}; creating initial one");
        engine
            .events()
            .status(format!("Creating initial backup for {name}..."));
        engine.check_and_create_backup(&path).await;
        // Spread disk load instead of bursting through a large folder.
        tokio::time::sleep(throttle).await;
    }

    engine
        .events()
        .status("Initialization and initial backup check complete.");
}

/// Newest backup per decoded original name, by modification time.
async fn latest_backup_per_original(
    engine: &BackupEngine,
) -> io::Result<Vec<(String, PathBuf)>> {
    let mut latest: HashMap<String, (PathBuf, SystemTime)> = HashMap::new();
    let mut entries = tokio::fs::read_dir(engine.backup_folder()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(original) = engine.codec().decode(name) else {
            continue;
        };
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let slot = latest
            .entry(original)
            .or_insert_with(|| (entry.path(), modified));
        if modified > slot.1 {
            *slot = (entry.path(), modified);
        }
    }
    Ok(latest
        .into_iter()
        .map(|(original, (path, _))| (original, path))
        .collect())
}

/// Snapshot of the live save files, taken in full before iteration so a
/// folder mutating mid-pass cannot skew the walk.
fn snapshot_live_saves(engine: &BackupEngine) -> Vec<PathBuf> {
    let mut saves: Vec<PathBuf> = WalkDir::new(engine.saves_folder())
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| engine.codec().is_save_name(name))
        })
        .map(|entry| entry.into_path())
        .collect();
    saves.sort();
    saves
}

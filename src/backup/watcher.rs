use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::naming::NamingCodec;

/// Subscribes to native change notifications on the saves folder and
/// forwards modified save-file paths into the worker's channel.
///
/// The native watcher stays subscribed for as long as this value is held;
/// dropping it unsubscribes.
pub struct FolderWatcher {
    _watcher: RecommendedWatcher,
}

impl FolderWatcher {
    pub fn start(
        folder: &Path,
        codec: &NamingCodec,
        tx: mpsc::UnboundedSender<PathBuf>,
    ) -> Result<Self> {
        let codec = codec.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        let is_save = path
                            .file_name()
                            .and_then(|name| name.to_str())
                            .is_some_and(|name| codec.is_save_name(name));
                        if !is_save {
                            continue;
                        }
                        debug!("modification detected: {}", path.display());
                        // A dropped receiver just means monitoring is
                        // shutting down.
                        let _ = tx.send(path);
                    }
                }
                Err(error) => error!("watch error: {error}"),
            },
            notify::Config::default(),
        )
        .context("creating filesystem watcher")?;
        watcher
            .watch(folder, RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", folder.display()))?;
        Ok(Self { _watcher: watcher })
    }
}

/// Collapses the burst of change events a single save operation produces
/// into one processed event per path and debounce window.
///
/// State grows only with distinct paths ever seen, which is bounded by the
/// small fixed cardinality of a save folder.
pub struct Debouncer {
    window: Duration,
    last_processed: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_processed: HashMap::new(),
        }
    }

    /// True when the debounce window since this path was last processed
    /// has elapsed; records the new processing time when it has.
    pub fn should_process(&mut self, path: &Path) -> bool {
        let now = Instant::now();
        match self.last_processed.get(path) {
            Some(last) if now.duration_since(*last) <= self.window => false,
            _ => {
                self.last_processed.insert(path.to_path_buf(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_for_a_path_passes() {
        let mut debouncer = Debouncer::new(Duration::from_millis(50));
        assert!(debouncer.should_process(Path::new("/saves/Slot1.save")));
    }

    #[test]
    fn repeat_within_window_is_dropped() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        assert!(debouncer.should_process(Path::new("/saves/Slot1.save")));
        assert!(!debouncer.should_process(Path::new("/saves/Slot1.save")));
    }

    #[test]
    fn repeat_after_window_passes_again() {
        let mut debouncer = Debouncer::new(Duration::from_millis(20));
        let path = Path::new("/saves/Slot1.save");
        assert!(debouncer.should_process(path));
        std::thread::sleep(Duration::from_millis(30));
        assert!(debouncer.should_process(path));
    }

    #[test]
    fn paths_are_debounced_independently() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        assert!(debouncer.should_process(Path::new("/saves/Slot1.save")));
        assert!(debouncer.should_process(Path::new("/saves/Slot2.save")));
        assert!(!debouncer.should_process(Path::new("/saves/Slot1.save")));
    }
}

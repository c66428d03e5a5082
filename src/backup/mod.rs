pub mod engine;
pub mod fingerprint;
pub mod naming;
pub mod prune;
pub mod reconcile;
pub mod restore;
pub mod service;
pub mod watcher;

pub use engine::BackupEngine;
pub use fingerprint::{FingerprintError, Fingerprinter};
pub use naming::{BackupFormat, NamingCodec};
pub use prune::RetentionPruner;
pub use service::BackupService;
pub use watcher::{Debouncer, FolderWatcher};

use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle of the monitoring worker.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Initializing,
    Monitoring,
    Stopping,
}

/// Events pushed from the backup worker to whatever observer is wired in.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Human-readable progress line
    Status { message: String },
    /// Monitoring started or stopped
    Monitoring { active: bool },
    BackupCreated { filename: String },
    BackupPruned { filename: String },
    /// Titled notification intended for user-facing display
    Notice { title: String, body: String },
}

/// Titles used for `Event::Notice`.
pub mod notices {
    pub const INITIAL_BACKUP_CREATED: &str = "Initial Backup Created";
    pub const BACKUP_CREATED: &str = "Backup Created";
    pub const BACKUP_ERROR: &str = "Backup Error";
    pub const PRUNE_ERROR: &str = "Prune Error";
    pub const PRUNE_SKIPPED: &str = "Prune Skipped";
    pub const FILE_READ_FAILURE: &str = "File Read Failure";
    pub const MONITORING_STARTED: &str = "Monitoring Started";
    pub const MONITORING_STOPPED: &str = "Monitoring Stopped";
}

/// Cloneable sink the worker side pushes events into. Emission is
/// fire-and-forget: sends never block and a missing receiver is not an
/// error, so the engine cannot stall on a slow or absent observer.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(Event::Status {
            message: message.into(),
        });
    }

    pub fn notice(&self, title: &str, body: impl Into<String>) {
        self.emit(Event::Notice {
            title: title.to_string(),
            body: body.into(),
        });
    }
}

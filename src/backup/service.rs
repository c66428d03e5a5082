use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::engine::BackupEngine;
use super::watcher::{Debouncer, FolderWatcher};
use super::{notices, reconcile, EngineState, Event, EventSink};
use crate::utils::config::Config;

/// Owns the monitoring lifecycle: starts the watcher + engine as a
/// cancellable background task and relays their events to subscribers.
pub struct BackupService {
    config: Mutex<Arc<Config>>,
    events: EventSink,
    state: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BackupService {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(Arc::new(config)),
            events: EventSink::new(128),
            state: Arc::new(Mutex::new(EngineState::Idle)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Observers drain this on their own schedule; emission on the worker
    /// side never waits for them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.lock().clone()
    }

    /// Starts the monitoring worker. A no-op when already running.
    pub async fn start_monitoring(&self) {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.stop.store(false, Ordering::Relaxed);
        let config = self.config.lock().clone();
        let engine = BackupEngine::new(&config, self.events.clone());
        *worker = Some(tokio::spawn(run_worker(
            engine,
            config,
            self.state.clone(),
            self.stop.clone(),
        )));
        self.events.emit(Event::Monitoring { active: true });
        self.events.notice(
            notices::MONITORING_STARTED,
            "Now actively monitoring your save files.",
        );
        info!("monitoring worker started");
    }

    /// Signals the worker to stop and waits for it to wind down. The
    /// watcher is detached and drained before this returns.
    pub async fn stop_monitoring(&self) {
        let mut worker = self.worker.lock().await;
        let Some(handle) = worker.take() else {
            return;
        };
        self.stop.store(true, Ordering::Relaxed);
        if let Err(error) = handle.await {
            error!("monitoring worker panicked: {error}");
        }
        self.events.emit(Event::Monitoring { active: false });
        self.events
            .notice(notices::MONITORING_STOPPED, "Monitoring has stopped.");
        info!("monitoring worker stopped");
    }

    /// Applies new settings; when monitoring is active, restarts with them.
    pub async fn update_settings(&self, config: Config) {
        let was_running = {
            let worker = self.worker.lock().await;
            worker.as_ref().is_some_and(|handle| !handle.is_finished())
        };
        *self.config.lock() = Arc::new(config);
        if was_running {
            self.stop_monitoring().await;
            self.start_monitoring().await;
        }
    }
}

async fn run_worker(
    mut engine: BackupEngine,
    config: Arc<Config>,
    state: Arc<Mutex<EngineState>>,
    stop: Arc<AtomicBool>,
) {
    *state.lock() = EngineState::Initializing;
    reconcile::run(&mut engine, &stop).await;

    if stop.load(Ordering::Relaxed) {
        // Stop arrived mid-reconciliation; the watcher never attaches.
        *state.lock() = EngineState::Stopping;
        engine.events().status("Monitoring stopped.");
        *state.lock() = EngineState::Idle;
        return;
    }

    let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
    let watcher = match FolderWatcher::start(engine.saves_folder(), engine.codec(), fs_tx) {
        Ok(watcher) => watcher,
        Err(error) => {
            error!("could not start filesystem watcher: {error:#}");
            engine
                .events()
                .status(format!("Error starting folder watcher: {error:#}"));
            *state.lock() = EngineState::Idle;
            return;
        }
    };
    *state.lock() = EngineState::Monitoring;
    engine.events().status(format!(
        "Monitoring '{}'...",
        engine.saves_folder().display()
    ));

    let mut debouncer = Debouncer::new(config.debounce_window);
    while !stop.load(Ordering::Relaxed) {
        tokio::select! {
            received = fs_rx.recv() => match received {
                Some(path) => {
                    if debouncer.should_process(&path) {
                        engine.check_and_create_backup(&path).await;
                    }
                }
                // Watcher side closed; nothing more will arrive.
                None => break,
            },
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    *state.lock() = EngineState::Stopping;
    // Unsubscribe first, then discard anything already queued so no late
    // event fires into a torn-down engine.
    drop(watcher);
    fs_rx.close();
    while fs_rx.try_recv().is_ok() {}
    engine.events().status("Monitoring stopped.");
    *state.lock() = EngineState::Idle;
}

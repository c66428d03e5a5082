pub mod backup;
pub mod utils;

pub use crate::backup::{BackupEngine, BackupService, EngineState, Event, EventSink};
pub use crate::utils::config::Config;

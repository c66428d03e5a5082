use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Folder holding the live save files
    pub saves_folder: PathBuf,

    /// Folder that receives backup files (created if missing)
    pub backup_folder: PathBuf,

    /// Backups kept per original save file
    pub retention_count: usize,

    /// Store backups as single-entry zip archives instead of raw copies
    pub compress: bool,

    /// Extension of the save files to protect, including the dot
    pub save_extension: String,

    /// Minimum spacing between processed change events for the same path
    pub debounce_window: Duration,

    /// Read attempts before a file is declared unreadable for the cycle
    pub hash_retries: u32,

    /// Delay between read attempts
    pub hash_retry_delay: Duration,

    /// Pause between initial backups during reconciliation
    pub reconcile_throttle: Duration,

    /// Idle tick of the monitoring loop; bounds stop latency
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            saves_folder: home.join("saves"),
            backup_folder: home.join("save-backups"),
            retention_count: 10,
            compress: false,
            save_extension: ".save".to_string(),
            debounce_window: Duration::from_secs(3),
            hash_retries: 3,
            hash_retry_delay: Duration::from_millis(200),
            reconcile_throttle: Duration::from_millis(200),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load config from environment variables over the defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(folder) = std::env::var("REWIND_SAVES_FOLDER") {
            config.saves_folder = PathBuf::from(folder);
        }

        if let Ok(folder) = std::env::var("REWIND_BACKUP_FOLDER") {
            config.backup_folder = PathBuf::from(folder);
        }

        if let Ok(count) = std::env::var("REWIND_RETENTION_COUNT") {
            config.retention_count = count
                .parse()
                .context("REWIND_RETENTION_COUNT must be an integer")?;
        }

        if let Ok(compress) = std::env::var("REWIND_COMPRESS") {
            config.compress = compress
                .parse()
                .context("REWIND_COMPRESS must be true or false")?;
        }

        if let Ok(extension) = std::env::var("REWIND_SAVE_EXTENSION") {
            config.save_extension = extension;
        }

        if let Ok(window) = std::env::var("REWIND_DEBOUNCE_WINDOW") {
            config.debounce_window = humantime::parse_duration(&window)
                .context("REWIND_DEBOUNCE_WINDOW must be a duration like '3s'")?;
        }

        if let Ok(retries) = std::env::var("REWIND_HASH_RETRIES") {
            config.hash_retries = retries
                .parse()
                .context("REWIND_HASH_RETRIES must be an integer")?;
        }

        if let Ok(delay) = std::env::var("REWIND_HASH_RETRY_DELAY") {
            config.hash_retry_delay = humantime::parse_duration(&delay)
                .context("REWIND_HASH_RETRY_DELAY must be a duration like '200ms'")?;
        }

        if let Ok(throttle) = std::env::var("REWIND_RECONCILE_THROTTLE") {
            config.reconcile_throttle = humantime::parse_duration(&throttle)
                .context("REWIND_RECONCILE_THROTTLE must be a duration like '200ms'")?;
        }

        if let Ok(interval) = std::env::var("REWIND_POLL_INTERVAL") {
            config.poll_interval = humantime::parse_duration(&interval)
                .context("REWIND_POLL_INTERVAL must be a duration like '1s'")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_count == 0 {
            bail!("retention_count must be at least 1");
        }
        if !self.save_extension.starts_with('.') || self.save_extension.len() < 2 {
            bail!("save_extension must start with '.' and name an extension");
        }
        Ok(())
    }
}

pub fn load_config() -> Result<Config> {
    Config::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_policy() {
        let config = Config::default();
        assert_eq!(config.retention_count, 10);
        assert!(!config.compress);
        assert_eq!(config.save_extension, ".save");
        assert_eq!(config.debounce_window, Duration::from_secs(3));
        assert_eq!(config.hash_retries, 3);
        assert_eq!(config.hash_retry_delay, Duration::from_millis(200));
        assert_eq!(config.reconcile_throttle, Duration::from_millis(200));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_retention_is_rejected() {
        let config = Config {
            retention_count: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn extension_must_carry_a_dot_and_a_name() {
        for extension in ["save", ".", ""] {
            let config = Config {
                save_extension: extension.to_string(),
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{extension:?}");
        }
    }
}

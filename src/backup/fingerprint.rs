use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::warn;

const CHUNK_SIZE: usize = 64 * 1024;

/// All read attempts for a file were exhausted. Non-fatal to monitoring:
/// the caller skips the backup cycle and waits for the next change event.
#[derive(Debug, Error)]
#[error("could not read {} after {attempts} attempts: {source}", .path.display())]
pub struct FingerprintError {
    pub path: PathBuf,
    pub attempts: u32,
    #[source]
    pub source: io::Error,
}

/// Computes content digests of save files, tolerating the game process
/// briefly holding a write lock.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    retries: u32,
    retry_delay: Duration,
}

impl Fingerprinter {
    pub fn new(retries: u32, retry_delay: Duration) -> Self {
        Self {
            retries: retries.max(1),
            retry_delay,
        }
    }

    /// Streams the file through blake3 in fixed-size chunks, retrying on
    /// read errors with a short delay between attempts.
    pub async fn digest(&self, path: &Path) -> Result<String, FingerprintError> {
        let mut last_error = None;
        for attempt in 1..=self.retries {
            match hash_file(path).await {
                Ok(digest) => return Ok(digest),
                Err(error) => {
                    warn!(
                        "read attempt {attempt}/{} failed for {}: {error}",
                        self.retries,
                        path.display()
                    );
                    last_error = Some(error);
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(FingerprintError {
            path: path.to_path_buf(),
            attempts: self.retries,
            source: last_error.unwrap_or_else(|| io::Error::other("no read attempt made")),
        })
    }
}

async fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

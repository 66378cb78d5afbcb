//! Exclusive advisory lock over the data directory.
//!
//! The lock is an OS file lock on `<data_dir>/.pipeline.lock`. It is released
//! when the guard drops and by the OS if the process dies, so a crashed run
//! never leaves a stale lock behind.

use fs2::FileExt;
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::constants::LOCK_FILE_NAME;
use crate::errors::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDirLock {
    path: PathBuf,
}

/// Holds the data directory until dropped.
#[derive(Debug)]
pub struct DataDirLockGuard {
    file: File,
    path: PathBuf,
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl DataDirLock {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(LOCK_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes the lock if it is free. `Ok(None)` means another holder has it.
    pub fn try_acquire(&self) -> Result<Option<DataDirLockGuard>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::Lock(format!("cannot open {}: {}", self.path.display(), e)))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Ok(None),
            Err(e) => {
                return Err(Error::Lock(format!(
                    "cannot lock {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }

        // Owner pid, for operators inspecting a stuck lock.
        let stamp = file
            .set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{}", std::process::id()));
        if let Err(e) = stamp {
            debug!("Could not write owner pid to {}: {}", self.path.display(), e);
        }

        Ok(Some(DataDirLockGuard {
            file,
            path: self.path.clone(),
        }))
    }

    /// Waits up to `timeout` for the lock, polling every `poll_interval`.
    pub async fn acquire(&self, timeout: Duration, poll_interval: Duration) -> Result<DataDirLockGuard> {
        let started = Instant::now();
        let mut announced = false;
        loop {
            if let Some(guard) = self.try_acquire()? {
                debug!("Acquired {} after {:?}", self.path.display(), started.elapsed());
                return Ok(guard);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(Error::LockContention {
                    path: self.path.display().to_string(),
                    waited,
                });
            }
            if !announced {
                info!("Waiting for {} held by another run", self.path.display());
                announced = true;
            }
            let remaining = timeout.saturating_sub(waited);
            tokio::time::sleep(poll_interval.min(remaining).max(Duration::from_millis(1))).await;
        }
    }
}

impl DataDirLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Unlocking {} failed: {}", self.path.display(), e);
        }
    }
}

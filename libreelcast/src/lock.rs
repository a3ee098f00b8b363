//! Per-account login locks
//!
//! A lock is a marker file created with `create_new`, so only one process can
//! hold it at a time. Holders get a [`LockGuard`] that deletes the marker on
//! drop, which covers success, early return and panic unwinding alike.
//!
//! Markers record the owning pid and creation time. A marker older than the
//! configured staleness window is treated as left behind by a crashed process
//! and reclaimed. A reclaim first renames the marker to a unique name, then
//! re-checks the age of the file it actually moved, so a waiter that judged an
//! old marker stale cannot delete a fresh one created in the meantime.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, SessionError};

#[derive(Debug, Clone)]
pub struct LockSettings {
    pub dir: PathBuf,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub stale_after: Option<Duration>,
}

impl LockSettings {
    /// Defaults: 30s timeout, 0.5s polling, markers stale after 10 minutes
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            stale_after: Some(Duration::from_secs(600)),
        }
    }
}

impl From<&Config> for LockSettings {
    fn from(config: &Config) -> Self {
        Self {
            dir: config.lock_dir(),
            timeout: config.sessions.lock_timeout(),
            poll_interval: config.sessions.lock_poll_interval(),
            stale_after: config.sessions.stale_after(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockMarker {
    pid: u32,
    created_at: u64,
}

#[derive(Debug, Clone)]
pub struct LockManager {
    settings: LockSettings,
}

impl LockManager {
    pub fn new(settings: LockSettings) -> Self {
        Self { settings }
    }

    pub fn lock_path(&self, account: &str) -> PathBuf {
        self.settings.dir.join(format!("{}.lock", account))
    }

    /// Try once to take the lock for `account`
    pub fn try_acquire(&self, account: &str) -> Result<Option<LockGuard>> {
        std::fs::create_dir_all(&self.settings.dir).map_err(SessionError::Io)?;
        let path = self.lock_path(account);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(SessionError::Io(e).into()),
        };

        let marker = LockMarker {
            pid: std::process::id(),
            created_at: unix_now(),
        };
        // An empty marker still excludes others; staleness then falls back to mtime
        if let Err(e) = serde_json::to_vec(&marker)
            .map_err(std::io::Error::from)
            .and_then(|bytes| file.write_all(&bytes))
        {
            warn!(account, "Failed to write lock marker contents: {}", e);
        }

        debug!(account, "Login lock acquired");
        Ok(Some(LockGuard {
            path,
            account: account.to_string(),
        }))
    }

    /// Wait up to the configured timeout for the lock on `account`
    pub async fn acquire(&self, account: &str) -> Result<LockGuard> {
        let started = Instant::now();

        loop {
            if let Some(guard) = self.try_acquire(account)? {
                return Ok(guard);
            }

            if self.reclaim_if_stale(account) {
                continue;
            }

            let waited = started.elapsed();
            if waited >= self.settings.timeout {
                warn!(account, waited_ms = waited.as_millis() as u64, "Login lock busy");
                return Err(SessionError::LockBusy {
                    account: account.to_string(),
                    waited,
                }
                .into());
            }

            debug!(account, "Login lock held elsewhere, waiting");
            sleep(self.settings.poll_interval).await;
        }
    }

    fn reclaim_if_stale(&self, account: &str) -> bool {
        let Some(stale_after) = self.settings.stale_after else {
            return false;
        };
        let path = self.lock_path(account);

        match marker_age(&path) {
            Some(age) if age >= stale_after => {}
            _ => return false,
        }

        let aside = self
            .settings
            .dir
            .join(format!("{}.lock.stale-{}", account, Uuid::new_v4()));
        match std::fs::rename(&path, &aside) {
            Ok(()) => {}
            // Someone else reclaimed or released it first
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
            Err(e) => {
                warn!(account, "Failed to move stale login lock aside: {}", e);
                return false;
            }
        }

        match marker_age(&aside) {
            Some(age) if age >= stale_after => {
                if let Err(e) = std::fs::remove_file(&aside) {
                    warn!(account, "Failed to remove stale login lock: {}", e);
                }
                warn!(account, age_secs = age.as_secs(), "Reclaimed stale login lock");
                true
            }
            _ => {
                // The marker was replaced after the first check; hand it back.
                // hard_link fails rather than overwrite if the path is taken again.
                if let Err(e) = std::fs::hard_link(&aside, &path) {
                    warn!(account, "Failed to restore live login lock: {}", e);
                }
                let _ = std::fs::remove_file(&aside);
                false
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn marker_age(path: &Path) -> Option<Duration> {
    let from_contents = std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<LockMarker>(&bytes).ok())
        .map(|marker| Duration::from_secs(unix_now().saturating_sub(marker.created_at)));

    from_contents.or_else(|| {
        std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
    })
}

/// Held login lock; the marker is removed when the guard drops
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    account: String,
}

impl LockGuard {
    pub fn account(&self) -> &str {
        &self.account
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(account = %self.account, "Login lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(account = %self.account, "Failed to release login lock: {}", e),
        }
    }
}

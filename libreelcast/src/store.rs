//! Durable job store
//!
//! The whole queue lives in one pretty-printed JSON array that is rewritten
//! on every mutation. There is no write-write coordination: exactly one
//! scheduler process is expected to own a store, and concurrent writers lose
//! updates (last save wins).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::types::{Job, JobStatus};

#[derive(Debug, Clone)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all jobs in stored order
    ///
    /// A missing file is an empty store. Content that is not a JSON array is
    /// moved aside to `<name>.corrupted.json` and reads as empty, so callers
    /// must not treat an empty result as proof that no jobs ever existed.
    ///
    /// Records are converted one by one. A record that cannot be read is
    /// skipped with a warning; the file as it was is first copied to
    /// `<name>.corrupted.json` so the next save does not lose it.
    pub fn load(&self) -> Result<Vec<Job>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Job store not found, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e).into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records = match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), "Job store corrupted, treating as empty: {}", e);
                self.backup_corrupt();
                return Ok(Vec::new());
            }
        };

        let mut jobs = Vec::with_capacity(records.len());
        let mut rejected = 0;
        for (index, mut record) in records.into_iter().enumerate() {
            upgrade_record(&mut record);
            match serde_json::from_value::<Job>(record) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(path = %self.path.display(), index, "Skipping unreadable job record: {}", e);
                    rejected += 1;
                }
            }
        }

        if rejected > 0 {
            self.copy_aside(&content);
        }

        Ok(jobs)
    }

    /// Replace the stored queue with `jobs`
    pub fn save(&self, jobs: &[Job]) -> Result<()> {
        let json = serde_json::to_vec_pretty(jobs).map_err(StoreError::Serialize)?;
        write_atomic(&self.path, &json).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Whether any stored job already points at `media_path`
    pub fn exists_by_media_path(&self, media_path: &Path) -> Result<bool> {
        Ok(contains_media_path(&self.load()?, media_path))
    }

    /// Move a failed job back to pending
    ///
    /// This is the operator-side escape hatch; the scheduler never does this
    /// unless `requeue_failed` is switched on.
    pub fn requeue(&self, id: &str) -> Result<Job> {
        let mut jobs = self.load()?;
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        job.transition(JobStatus::Pending)?;
        job.requeues += 1;
        let requeued = job.clone();

        self.save(&jobs)?;
        info!(job_id = %id, "Job requeued");
        Ok(requeued)
    }

    fn backup_corrupt(&self) {
        let backup = self.backup_path();
        match std::fs::rename(&self.path, &backup) {
            Ok(()) => warn!(backup = %backup.display(), "Corrupted job store backed up"),
            Err(e) => warn!("Failed to back up corrupted job store: {}", e),
        }
    }

    fn copy_aside(&self, content: &str) {
        let backup = self.backup_path();
        match write_atomic(&backup, content.as_bytes()) {
            Ok(()) => warn!(backup = %backup.display(), "Job store with unreadable records copied aside"),
            Err(e) => warn!("Failed to copy job store aside: {}", e),
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("corrupted.json")
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Reconcile field spellings from older job files before typed parsing
///
/// Records written by the bulk creator carry `type` while the old runner
/// wrote `post_type`; some carry both. `type` wins unless it is null.
fn upgrade_record(record: &mut Value) {
    let Some(fields) = record.as_object_mut() else {
        return;
    };
    if let Some(legacy) = fields.remove("post_type") {
        let current = fields.get("type").filter(|v| !v.is_null());
        if current.is_none() {
            fields.insert("type".to_string(), legacy);
        }
    }
}

/// Dedup check on the media path, comparing both as written and canonicalized
pub fn contains_media_path(jobs: &[Job], media_path: &Path) -> bool {
    let canonical = std::fs::canonicalize(media_path).ok();

    jobs.iter().any(|job| {
        if job.media_path == media_path {
            return true;
        }
        match &canonical {
            Some(canonical) => {
                &job.media_path == canonical
                    || std::fs::canonicalize(&job.media_path).ok().as_ref() == Some(canonical)
            }
            None => false,
        }
    })
}

/// Write `contents` to a sibling temp file and rename it over `path`
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

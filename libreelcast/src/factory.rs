//! Job creation from a folder of prepared posts
//!
//! A source root holds one subdirectory per post, each with a single media
//! file and optionally a `final_caption.txt`. [`JobFactory::create_jobs`]
//! turns every new subdirectory into a pending job, spacing the jobs `gap`
//! apart. Media paths already in the store are skipped, so running a batch
//! twice over the same tree creates nothing the second time.

use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ReelcastError, Result};
use crate::media::{self, MediaKind};
use crate::scheduling;
use crate::store::{contains_media_path, JobStore};
use crate::types::{validate_account, Job, NewJob, StoredSecret};

/// Parameters of a batch scan
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub source_root: PathBuf,
    pub account: String,
    pub secret: Option<StoredSecret>,
    /// First slot, `YYYY-MM-DD HH:MM`
    pub start_time: String,
    pub gap: Duration,
}

impl BatchRequest {
    pub fn new(source_root: impl Into<PathBuf>, account: &str, start_time: &str, gap: Duration) -> Self {
        Self {
            source_root: source_root.into(),
            account: account.to_string(),
            secret: None,
            start_time: start_time.to_string(),
            gap,
        }
    }

    pub fn with_secret(mut self, secret: StoredSecret) -> Self {
        self.secret = Some(secret);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Subdirectories visited
    pub scanned: usize,
    pub created: usize,
    /// Folders without media, or whose media is already queued
    pub skipped: usize,
    pub first_slot: Option<NaiveDateTime>,
    pub last_slot: Option<NaiveDateTime>,
    pub job_ids: Vec<String>,
}

pub struct JobFactory {
    store: JobStore,
}

impl JobFactory {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn create_jobs(&self, request: &BatchRequest) -> Result<BatchReport> {
        self.create_jobs_at(request, Local::now().naive_local())
    }

    /// Batch creation with an explicit notion of "now"
    ///
    /// All input is validated before anything is written; the store is saved
    /// once at the end, and only when at least one job was created.
    pub fn create_jobs_at(&self, request: &BatchRequest, now: NaiveDateTime) -> Result<BatchReport> {
        validate_account(&request.account)?;
        let start = scheduling::parse_start_time(&request.start_time)?;
        if request.gap.is_zero() {
            return Err(ReelcastError::InvalidInput(
                "Gap between posts must be greater than zero".to_string(),
            ));
        }
        let gap = chrono::Duration::from_std(request.gap)
            .map_err(|e| ReelcastError::InvalidInput(format!("Gap out of range: {}", e)))?;

        let folders = post_folders(&request.source_root)?;

        let mut jobs = self.store.load()?;
        let mut report = BatchReport::default();
        let mut slot = scheduling::first_slot(start, now);
        if slot != start {
            info!(
                requested = %scheduling::format_slot(start),
                adjusted = %scheduling::format_slot(slot),
                "Start time is in the past, moving first slot forward"
            );
        }

        for folder in folders {
            report.scanned += 1;

            let Some(media_path) = media::find_media_file(&folder).ok().flatten() else {
                debug!(folder = %folder.display(), "No media found, skipping");
                report.skipped += 1;
                continue;
            };

            if contains_media_path(&jobs, &media_path) {
                debug!(media = %media_path.display(), "Already scheduled, skipping");
                report.skipped += 1;
                continue;
            }

            if report.created > 0 {
                slot = slot.checked_add_signed(gap).ok_or_else(|| {
                    ReelcastError::InvalidInput(format!(
                        "Gap of {} pushes slot {} past the supported date range",
                        humantime::format_duration(request.gap),
                        report.created + 1
                    ))
                })?;
            }

            let media_path = std::fs::canonicalize(&media_path).unwrap_or(media_path);
            let caption_path = media::caption_file_in(&folder);

            let job = Job::pending(
                &request.account,
                request.secret.clone(),
                media_path,
                caption_path,
                slot,
                now,
            );
            debug!(job_id = %job.id, slot = %scheduling::format_slot(slot), "Job created");

            report.first_slot.get_or_insert(slot);
            report.last_slot = Some(slot);
            report.job_ids.push(job.id.clone());
            report.created += 1;
            jobs.push(job);
        }

        if report.created > 0 {
            self.store.save(&jobs)?;
        }

        info!(
            account = %request.account,
            created = report.created,
            skipped = report.skipped,
            "Batch scheduled"
        );
        Ok(report)
    }

    pub fn create_job(&self, new_job: NewJob) -> Result<Job> {
        self.create_job_at(new_job, Local::now().naive_local())
    }

    /// Enqueue one job for a specific media file
    pub fn create_job_at(&self, new_job: NewJob, now: NaiveDateTime) -> Result<Job> {
        validate_account(&new_job.account)?;

        if !new_job.media_path.is_file() {
            return Err(ReelcastError::InvalidInput(format!(
                "Media file not found: {}",
                new_job.media_path.display()
            )));
        }
        if MediaKind::from_path(&new_job.media_path).is_none() {
            return Err(ReelcastError::InvalidInput(format!(
                "Not an image or video: {}",
                new_job.media_path.display()
            )));
        }

        let run_time = scheduling::resolve_run_time(Some(&new_job.scheduled_time), None)?;
        if run_time <= now {
            return Err(ReelcastError::InvalidInput(format!(
                "Scheduled time {} is not in the future",
                new_job.scheduled_time.trim()
            )));
        }

        let mut jobs = self.store.load()?;
        if contains_media_path(&jobs, &new_job.media_path) {
            return Err(ReelcastError::InvalidInput(format!(
                "Media already scheduled: {}",
                new_job.media_path.display()
            )));
        }

        let media_path =
            std::fs::canonicalize(&new_job.media_path).unwrap_or_else(|_| new_job.media_path.clone());
        let caption_path = new_job.caption_path.clone().or_else(|| {
            media_path
                .parent()
                .and_then(media::caption_file_in)
        });

        let mut job = Job::pending(
            &new_job.account,
            new_job.secret,
            media_path,
            caption_path,
            run_time,
            now,
        );
        job.scheduled_time = Some(new_job.scheduled_time.trim().to_string());
        job.caption_override = new_job.caption.filter(|c| !c.trim().is_empty());
        job.post_type = new_job.post_type;

        jobs.push(job.clone());
        self.store.save(&jobs)?;

        info!(job_id = %job.id, account = %job.account, "Job created");
        Ok(job)
    }
}

/// Immediate subdirectories of `root`, sorted by path
fn post_folders(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ReelcastError::InvalidInput(format!(
            "Source folder not found: {}",
            root.display()
        )));
    }

    let entries = std::fs::read_dir(root).map_err(|e| {
        ReelcastError::InvalidInput(format!("Cannot read {}: {}", root.display(), e))
    })?;

    let mut folders = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ReelcastError::InvalidInput(format!("Cannot read {}: {}", root.display(), e)))?
            .path();
        if path.is_dir() {
            folders.push(path);
        }
    }
    folders.sort();
    Ok(folders)
}

//! Job scheduler loop
//!
//! Each tick loads the job store, dispatches every pending job whose run time
//! has passed, and writes status changes back as it goes. Jobs run one at a
//! time, in store order.
//!
//! The scheduler persists its own snapshot of the queue: a job file edited by
//! another writer while a tick is in flight is overwritten by the next save.

use chrono::{Local, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::store::JobStore;
use crate::types::{Job, JobStatus};
use crate::uploader::{UploadRequest, Uploader};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    /// Pause after every dispatched job, including the last one of a tick
    pub cooldown: Duration,
    pub requeue_failed: bool,
    pub max_requeues: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.scheduler.poll_interval_secs.max(1)),
            cooldown: Duration::from_secs(config.scheduler.cooldown_secs),
            requeue_failed: config.scheduler.requeue_failed,
            max_requeues: config.scheduler.max_requeues,
        }
    }
}

/// What one pass over the queue did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_due: usize,
    pub invalid_schedule: usize,
    pub requeued: usize,
}

pub struct Scheduler {
    store: JobStore,
    uploader: Uploader,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(store: JobStore, uploader: Uploader, settings: SchedulerSettings) -> Self {
        Self {
            store,
            uploader,
            settings,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Run one pass against the local wall clock
    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(Local::now().naive_local()).await
    }

    /// Run one pass as if the time were `now`
    pub async fn tick_at(&self, now: NaiveDateTime) -> Result<TickReport> {
        let mut jobs = self.store.load()?;
        let mut report = TickReport::default();
        let mut dirty = false;

        for job in jobs.iter().filter(|job| job.status == JobStatus::Running) {
            warn!(
                job_id = %job.id,
                "Job still marked running from an interrupted run; leaving it untouched"
            );
        }

        if self.settings.requeue_failed {
            for job in jobs.iter_mut() {
                if job.status == JobStatus::Failed && job.requeues < self.settings.max_requeues {
                    job.transition(JobStatus::Pending)?;
                    job.requeues += 1;
                    report.requeued += 1;
                    dirty = true;
                    info!(job_id = %job.id, requeues = job.requeues, "Failed job requeued");
                }
            }
        }

        let mut due = Vec::new();
        for (index, job) in jobs.iter_mut().enumerate() {
            if job.status != JobStatus::Pending {
                continue;
            }
            match job.run_time() {
                Ok(run_time) if run_time <= now => due.push(index),
                Ok(_) => report.not_due += 1,
                Err(e) => {
                    warn!(job_id = %job.id, "Job has no usable schedule: {}", e);
                    job.fail(e.to_string())?;
                    report.invalid_schedule += 1;
                    dirty = true;
                }
            }
        }

        if dirty {
            self.store.save(&jobs)?;
        }

        if !due.is_empty() {
            info!("Found {} job(s) due for upload", due.len());
        }

        for index in due.iter().copied() {
            jobs[index].transition(JobStatus::Running)?;
            self.store.save(&jobs)?;
            report.dispatched += 1;

            let succeeded = self.dispatch(&mut jobs[index]).await?;
            if succeeded {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            self.store.save(&jobs)?;

            if !self.settings.cooldown.is_zero() {
                sleep(self.settings.cooldown).await;
            }
        }

        Ok(report)
    }

    async fn dispatch(&self, job: &mut Job) -> Result<bool> {
        info!(job_id = %job.id, account = %job.account, media = %job.media_path.display(), "Running job");

        let request = UploadRequest {
            account: job.account.clone(),
            folder: job.post_folder().to_path_buf(),
            secret: job.secret.as_ref().map(|s| s.to_secret()),
            media: Some(job.media_path.clone()),
            caption_override: job.caption_override.clone(),
            caption_file: job.caption_path.clone(),
            post_type: job.post_type,
        };

        let outcome = self.uploader.upload(&request).await;
        job.retries = outcome.attempts;

        if outcome.ok {
            job.transition(JobStatus::Done)?;
            job.completed_at = Some(Local::now().naive_local());
            job.platform_id = outcome.result;
            job.last_error = None;
            info!(job_id = %job.id, "Job done");
            Ok(true)
        } else {
            let message = outcome
                .error
                .unwrap_or_else(|| "Upload failed".to_string());
            error!(job_id = %job.id, "Job failed: {}", message);
            job.fail(message)?;
            Ok(false)
        }
    }

    /// Tick until `shutdown` is set
    ///
    /// Errors from a single tick are logged and the loop carries on. The flag
    /// is checked between ticks and at least once a second while idle; an
    /// upload in flight is allowed to finish.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            store = %self.store.path().display(),
            "Scheduler started"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping scheduler");
                break;
            }

            if let Err(e) = self.tick().await {
                error!("Error processing jobs: {}", e);
            }

            let mut remaining = self.settings.poll_interval;
            while !remaining.is_zero() {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                let slice = remaining.min(Duration::from_secs(1));
                sleep(slice).await;
                remaining -= slice;
            }
        }
    }
}

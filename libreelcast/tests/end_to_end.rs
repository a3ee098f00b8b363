//! End-to-end workflow tests
//!
//! These tests drive the whole pipeline against the mock platform:
//! - Configuration loading and component wiring
//! - Batch creation followed by scheduled dispatch
//! - Session reuse across jobs and recovery from an expired session
//! - Corrupt store recovery

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use libreelcast::platforms::mock::{MockPlatform, UploadKind};
use libreelcast::{
    BatchRequest, Config, JobFactory, JobStatus, JobStore, Scheduler, SchedulerSettings,
    SessionManager, StoredSecret, UploadSettings, Uploader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2030, 6, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn write_config(dir: &Path) -> Result<PathBuf> {
    let root = dir.display().to_string().replace('\\', "/");
    let content = format!(
        r#"
[store]
path = "{root}/scheduled_jobs.json"

[sessions]
dir = "{root}/sessions"
lock_dir = "{root}/locks"
lock_timeout_secs = 5
lock_poll_interval_ms = 20

[upload]
max_attempts = 3
backoff_base_ms = 1
jitter_ms = 0

[scheduler]
poll_interval_secs = 1
"#
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, content)?;
    Ok(path)
}

fn add_post(source: &Path, name: &str, media: &str, caption: &str) -> Result<()> {
    let folder = source.join(name);
    std::fs::create_dir_all(&folder)?;
    std::fs::write(folder.join(media), b"media")?;
    std::fs::write(folder.join("final_caption.txt"), caption)?;
    Ok(())
}

struct Pipeline {
    platform: MockPlatform,
    factory: JobFactory,
    scheduler: Scheduler,
    config: Config,
}

fn pipeline(dir: &Path) -> Result<Pipeline> {
    let config = Config::load_from_path(&write_config(dir)?)?;
    let platform = MockPlatform::default();

    let sessions = Arc::new(SessionManager::from_config(
        Arc::new(platform.clone()),
        &config,
    ));
    let uploader = Uploader::new(sessions, UploadSettings::from(&config.upload));
    let scheduler = Scheduler::new(
        JobStore::new(config.store_path()),
        uploader,
        SchedulerSettings::from(&config),
    );
    let factory = JobFactory::new(JobStore::new(config.store_path()));

    Ok(Pipeline {
        platform,
        factory,
        scheduler,
        config,
    })
}

#[tokio::test]
async fn test_batch_then_scheduled_dispatch() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = temp_dir.path().join("posts");
    add_post(&source, "post_01", "image.jpg", "First post")?;
    add_post(&source, "post_02", "clip.mp4", "Second post")?;
    let p = pipeline(temp_dir.path())?;

    let report = p.factory.create_jobs_at(
        &BatchRequest::new(&source, "acct1", "2030-06-01 10:00", Duration::from_secs(3600))
            .with_secret(StoredSecret::new("pw")),
        at(8, 0),
    )?;
    assert_eq!(report.created, 2);
    assert_eq!(report.last_slot, Some(at(11, 0)));

    // Nothing is due yet
    let early = p.scheduler.tick_at(at(9, 59)).await?;
    assert_eq!(early.dispatched, 0);
    assert_eq!(early.not_due, 2);

    let first = p.scheduler.tick_at(at(10, 0)).await?;
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.not_due, 1);

    let second = p.scheduler.tick_at(at(11, 30)).await?;
    assert_eq!(second.succeeded, 1);

    let jobs = JobStore::new(p.config.store_path()).load()?;
    assert!(jobs.iter().all(|job| job.status == JobStatus::Done));
    assert!(jobs.iter().all(|job| job.retries == 1));

    let uploads = p.platform.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].kind, UploadKind::Image);
    assert_eq!(uploads[0].caption, "First post");
    assert_eq!(uploads[1].kind, UploadKind::Video);
    assert_eq!(uploads[1].caption, "Second post");

    // The second job reused the session saved by the first
    assert_eq!(p.platform.credential_login_count(), 1);
    assert!(p.platform.session_login_count() >= 1);
    assert!(p.config.sessions_dir().join("acct1.json").exists());

    Ok(())
}

#[tokio::test]
async fn test_expired_session_recovers_within_one_job() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = temp_dir.path().join("posts");
    add_post(&source, "post_01", "image.jpg", "Hello")?;
    let p = pipeline(temp_dir.path())?;

    p.factory.create_jobs_at(
        &BatchRequest::new(&source, "acct1", "2030-06-01 10:00", Duration::from_secs(60))
            .with_secret(StoredSecret::new("pw")),
        at(8, 0),
    )?;
    p.platform.script_uploads([Err(
        libreelcast::error::PlatformError::LoginRequired("challenge".to_string()),
    )]);

    let report = p.scheduler.tick_at(at(10, 0)).await?;

    assert_eq!(report.succeeded, 1);
    let jobs = JobStore::new(p.config.store_path()).load()?;
    assert_eq!(jobs[0].status, JobStatus::Done);
    assert_eq!(jobs[0].retries, 2);
    assert_eq!(p.platform.credential_login_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_job_without_secret_or_session_fails_cleanly() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let source = temp_dir.path().join("posts");
    add_post(&source, "post_01", "image.jpg", "Hello")?;
    let p = pipeline(temp_dir.path())?;

    p.factory.create_jobs_at(
        &BatchRequest::new(&source, "acct1", "2030-06-01 10:00", Duration::from_secs(60)),
        at(8, 0),
    )?;

    let report = p.scheduler.tick_at(at(10, 0)).await?;

    assert_eq!(report.failed, 1);
    let jobs = JobStore::new(p.config.store_path()).load()?;
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].retries, 0);
    assert!(jobs[0]
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("no password provided"));
    assert_eq!(p.platform.upload_attempts(), 0);

    Ok(())
}

#[tokio::test]
async fn test_corrupt_store_is_set_aside() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let p = pipeline(temp_dir.path())?;
    let store_path = p.config.store_path();
    std::fs::write(&store_path, "[{ this is not json")?;

    let report = p.scheduler.tick_at(at(10, 0)).await?;

    assert_eq!(report.dispatched, 0);
    assert!(!store_path.exists());
    let backup = temp_dir.path().join("scheduled_jobs.corrupted.json");
    assert_eq!(std::fs::read_to_string(backup)?, "[{ this is not json");

    Ok(())
}

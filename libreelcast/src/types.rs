//! Core types for Reelcast

use chrono::NaiveDateTime;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{ReelcastError, Result};
use crate::scheduling;

/// A scheduled publish operation.
///
/// Field names on disk follow the job file written by earlier tooling
/// (`username`, `password`, `caption`, `type`), so existing queues load as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default = "new_job_id")]
    pub id: String,

    #[serde(rename = "username")]
    pub account: String,

    #[serde(rename = "password", default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<StoredSecret>,

    pub media_path: PathBuf,

    #[serde(default)]
    pub caption_path: Option<PathBuf>,

    /// Inline caption; wins over `caption_path` at execution time
    #[serde(rename = "caption", default)]
    pub caption_override: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,

    /// Schedule field used by older job files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<String>,

    #[serde(rename = "type", alias = "post_type", default)]
    pub post_type: Option<PostType>,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(default)]
    pub retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub requeues: u32,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,

    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<NaiveDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
}

fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Bookkeeping timestamps written by older tooling carry UTC offsets
/// (`2025-02-20T09:00:00.123456+00:00`); anything unreadable becomes `None`
/// rather than rejecting the record.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(scheduling::parse_timestamp))
}

impl Job {
    /// Build a fresh pending job scheduled at `slot`
    pub fn pending(
        account: &str,
        secret: Option<StoredSecret>,
        media_path: PathBuf,
        caption_path: Option<PathBuf>,
        slot: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id: new_job_id(),
            account: account.to_string(),
            secret,
            media_path,
            caption_path,
            caption_override: None,
            scheduled_time: Some(scheduling::format_slot(slot)),
            run_at: None,
            post_type: None,
            status: JobStatus::Pending,
            retries: 0,
            last_error: None,
            requeues: 0,
            created_at: Some(now),
            completed_at: None,
            platform_id: None,
        }
    }

    /// Effective run time, reading `scheduled_time` first and `run_at` second
    pub fn run_time(&self) -> Result<NaiveDateTime> {
        scheduling::resolve_run_time(self.scheduled_time.as_deref(), self.run_at.as_deref())
    }

    /// Folder holding the media file (and, by convention, its caption file)
    pub fn post_folder(&self) -> &Path {
        self.media_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// Move the job to `next`, rejecting transitions outside the lifecycle
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ReelcastError::InvalidInput(format!(
                "Job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Record a failed dispatch
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.last_error = Some(error.into());
        Ok(())
    }
}

/// Lifecycle of a job: pending → running → done | failed.
///
/// A pending job whose schedule cannot be read goes straight to failed.
/// `Failed → Pending` exists only for explicit requeueing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    #[serde(alias = "photo")]
    Image,
    Video,
    Reel,
    Story,
    Carousel,
}

impl std::str::FromStr for PostType {
    type Err = ReelcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "image" | "photo" => Ok(PostType::Image),
            "video" => Ok(PostType::Video),
            "reel" => Ok(PostType::Reel),
            "story" => Ok(PostType::Story),
            "carousel" | "album" => Ok(PostType::Carousel),
            other => Err(ReelcastError::InvalidInput(format!(
                "Unknown post type '{}'. Valid options: image, video, reel, story, carousel",
                other
            ))),
        }
    }
}

/// Account password as stored in the job file.
///
/// Kept out of `Debug` output; converted to a [`SecretString`] before use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredSecret(String);

impl StoredSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn to_secret(&self) -> SecretString {
        SecretString::from(self.0.clone())
    }
}

impl std::fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoredSecret(***)")
    }
}

/// Input for creating a single job outside of a batch scan
#[derive(Debug, Clone)]
pub struct NewJob {
    pub account: String,
    pub secret: Option<StoredSecret>,
    pub media_path: PathBuf,
    pub caption_path: Option<PathBuf>,
    pub caption: Option<String>,
    pub scheduled_time: String,
    pub post_type: Option<PostType>,
}

impl NewJob {
    pub fn new(account: &str, media_path: impl Into<PathBuf>, scheduled_time: &str) -> Self {
        Self {
            account: account.to_string(),
            secret: None,
            media_path: media_path.into(),
            caption_path: None,
            caption: None,
            scheduled_time: scheduled_time.to_string(),
            post_type: None,
        }
    }
}

/// Validate an account identifier
///
/// Rules:
/// - Between 2 and 64 characters
/// - ASCII alphanumerics, dots, hyphens and underscores only
///
/// Identifiers name session and lock files, so anything that could form a
/// path component other than a plain file name is rejected.
pub fn validate_account(account: &str) -> Result<()> {
    if account.len() < 2 {
        return Err(ReelcastError::InvalidInput(format!(
            "Invalid account '{}': must be at least 2 characters",
            account
        )));
    }

    if account.len() > 64 {
        return Err(ReelcastError::InvalidInput(format!(
            "Account too long: {} characters (max 64)",
            account.len()
        )));
    }

    if !account
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(ReelcastError::InvalidInput(format!(
            "Invalid account '{}'. Must be alphanumeric with dots, hyphens or underscores",
            account
        )));
    }

    if account.chars().all(|c| c == '.') {
        return Err(ReelcastError::InvalidInput(format!(
            "Invalid account '{}'",
            account
        )));
    }

    Ok(())
}

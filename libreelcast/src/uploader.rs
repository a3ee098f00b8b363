//! Upload execution with bounded retries
//!
//! [`Uploader::upload`] never fails: every problem, from a folder without
//! media to an exhausted retry budget, comes back as an [`UploadOutcome`]
//! with `ok == false`, ready to be recorded on the job.

use rand::Rng;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{Config, UploadConfig};
use crate::error::{PlatformError, Result};
use crate::media::{self, MediaKind};
use crate::platforms::PlatformClient;
use crate::session::SessionManager;
use crate::types::PostType;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_attempts: u32,
    /// Delay after failed attempt `n` is `backoff_base * 2^n` plus jitter
    pub backoff_base: Duration,
    pub jitter: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&Config> for UploadSettings {
    fn from(config: &Config) -> Self {
        Self::from(&config.upload)
    }
}

impl From<&UploadConfig> for UploadSettings {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

/// What to upload, and as whom
#[derive(Debug)]
pub struct UploadRequest {
    pub account: String,
    pub folder: PathBuf,
    pub secret: Option<SecretString>,
    /// Media file to post; located in `folder` when unset
    pub media: Option<PathBuf>,
    pub caption_override: Option<String>,
    pub caption_file: Option<PathBuf>,
    /// Detected from the media extension when unset
    pub post_type: Option<PostType>,
}

impl UploadRequest {
    pub fn new(account: &str, folder: impl Into<PathBuf>) -> Self {
        Self {
            account: account.to_string(),
            folder: folder.into(),
            secret: None,
            media: None,
            caption_override: None,
            caption_file: None,
            post_type: None,
        }
    }

    pub fn with_secret(mut self, secret: SecretString) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption_override = Some(caption.into());
        self
    }

    pub fn with_post_type(mut self, post_type: PostType) -> Self {
        self.post_type = Some(post_type);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub ok: bool,
    /// Platform media id on success
    pub result: Option<String>,
    pub error: Option<String>,
    /// Upload calls made
    pub attempts: u32,
}

impl UploadOutcome {
    fn success(result: String, attempts: u32) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
            attempts,
        }
    }

    fn failure(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
            attempts,
        }
    }
}

/// Upload resolved down to concrete files and caption text
#[derive(Debug)]
struct PreparedUpload {
    post_type: PostType,
    media: PathBuf,
    kind: MediaKind,
    album: Vec<PathBuf>,
    caption: String,
}

pub struct Uploader {
    sessions: Arc<SessionManager>,
    settings: UploadSettings,
}

impl Uploader {
    pub fn new(sessions: Arc<SessionManager>, settings: UploadSettings) -> Self {
        Self { sessions, settings }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub async fn upload(&self, request: &UploadRequest) -> UploadOutcome {
        let account = request.account.as_str();

        let prepared = match prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => return UploadOutcome::failure(e.to_string(), 0),
        };

        let mut client = match self
            .sessions
            .client_for(account, request.secret.as_ref())
            .await
        {
            Ok(client) => client,
            Err(e) => return UploadOutcome::failure(e.to_string(), 0),
        };

        let max_attempts = self.settings.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(
                account,
                attempt,
                post_type = ?prepared.post_type,
                media = %prepared.media.display(),
                "Uploading"
            );

            match dispatch(client.as_ref(), &prepared).await {
                Ok(media_id) => {
                    info!(account, attempt, media_id = %media_id, "Upload successful");
                    return UploadOutcome::success(media_id, attempt);
                }
                Err(e) if e.is_login_required() => {
                    warn!(account, attempt, "Session expired, forcing full login: {}", e);
                    let Some(secret) = request.secret.as_ref() else {
                        return UploadOutcome::failure(
                            format!("{} (no password available to log in again)", e),
                            attempt,
                        );
                    };
                    client = match self.sessions.force_login(account, secret).await {
                        Ok(client) => client,
                        Err(login_error) => {
                            return UploadOutcome::failure(login_error.to_string(), attempt)
                        }
                    };
                    last_error = e.to_string();
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let wait = self.backoff_delay(attempt);
                        warn!(
                            account,
                            attempt,
                            "Upload error: {}, retrying in {:.2}s",
                            e,
                            wait.as_secs_f64()
                        );
                        sleep(wait).await;
                    }
                }
            }
        }

        warn!(account, max_attempts, "Upload failed after retries: {}", last_error);
        UploadOutcome::failure(
            format!("Upload failed after {} attempts: {}", max_attempts, last_error),
            max_attempts,
        )
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .settings
            .backoff_base
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(Duration::MAX);
        let jitter_ms = self.settings.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        exponential.saturating_add(Duration::from_millis(jitter))
    }
}

fn prepare(request: &UploadRequest) -> Result<PreparedUpload> {
    let media = match &request.media {
        Some(path) if path.is_file() => path.clone(),
        Some(path) => {
            return Err(PlatformError::UnsupportedMedia(format!(
                "Media file not found: {}",
                path.display()
            ))
            .into())
        }
        None => media::find_media_file(&request.folder)
            .ok()
            .flatten()
            .ok_or_else(|| {
                PlatformError::UnsupportedMedia(format!(
                    "No media found in: {}",
                    request.folder.display()
                ))
            })?,
    };

    let kind = MediaKind::from_path(&media).ok_or_else(|| {
        PlatformError::UnsupportedMedia(format!("Unsupported media type: {}", media.display()))
    })?;

    let post_type = request.post_type.unwrap_or(match kind {
        MediaKind::Video => PostType::Video,
        MediaKind::Image => PostType::Image,
    });

    let album = if post_type == PostType::Carousel {
        let images = media::list_images(&request.folder).unwrap_or_default();
        if images.len() < 2 {
            return Err(PlatformError::UnsupportedMedia(format!(
                "Carousel needs at least 2 images, found {} in {}",
                images.len(),
                request.folder.display()
            ))
            .into());
        }
        images
    } else {
        Vec::new()
    };

    let caption = media::resolve_caption(
        request.caption_override.as_deref(),
        request.caption_file.as_deref(),
        &request.folder,
    );

    Ok(PreparedUpload {
        post_type,
        media,
        kind,
        album,
        caption,
    })
}

async fn dispatch(client: &dyn PlatformClient, upload: &PreparedUpload) -> Result<String> {
    let media: &Path = &upload.media;
    let caption = upload.caption.as_str();

    match upload.post_type {
        PostType::Image => client.upload_image(media, caption).await,
        PostType::Video => client.upload_video(media, caption).await,
        PostType::Reel => client.upload_reel(media, caption).await,
        PostType::Story => client.upload_story(media, upload.kind).await,
        PostType::Carousel => client.upload_album(&upload.album, caption).await,
    }
}

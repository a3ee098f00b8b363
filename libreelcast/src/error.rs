//! Error types for Reelcast

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReelcastError>;

#[derive(Error, Debug)]
pub enum ReelcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid schedule: {0}")]
    ScheduleFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ReelcastError {
    /// True when the platform reported that the session is no longer valid
    pub fn is_login_required(&self) -> bool {
        matches!(self, ReelcastError::Platform(PlatformError::LoginRequired(_)))
    }

    /// True when a per-account lock could not be acquired in time
    pub fn is_lock_busy(&self) -> bool {
        matches!(self, ReelcastError::Session(SessionError::LockBusy { .. }))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize jobs: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Login lock busy for account '{account}' (waited {}s)", .waited.as_secs_f32())]
    LockBusy { account: String, waited: Duration },

    #[error("Session IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Login required: {0}")]
    LoginRequired(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),
}

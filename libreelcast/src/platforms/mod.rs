//! Upload capability boundary
//!
//! Reelcast does not talk to the destination platform itself. Hosts plug in a
//! [`ClientFactory`] that produces [`PlatformClient`]s; the session manager
//! authenticates them and the uploader drives them.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libreelcast::platforms::mock::MockPlatform;
//! use libreelcast::session::SessionManager;
//! use libreelcast::lock::{LockManager, LockSettings};
//!
//! # async fn example() -> libreelcast::Result<()> {
//! let platform = MockPlatform::default();
//! let sessions = SessionManager::new(
//!     Arc::new(platform),
//!     "sessions".into(),
//!     LockManager::new(LockSettings::new(".login_locks")),
//! );
//!
//! if let Some(client) = sessions.load_session("acct1").await {
//!     client.verify_identity("acct1").await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;
use crate::media::MediaKind;
use crate::session::DeviceFingerprint;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// An authenticated (or authenticating) connection to the platform for one account
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Device identity the client presents
    fn device(&self) -> &DeviceFingerprint;

    /// Prime the client with previously saved session state
    ///
    /// Must be called on a client that already carries the device fingerprint
    /// the state was issued against.
    fn restore_session(&mut self, state: &serde_json::Value) -> Result<()>;

    /// Export session state for persistence
    fn session_state(&self) -> Result<serde_json::Value>;

    /// Log in. With `secret` this is a full credential login; without it the
    /// client resumes from restored session state.
    ///
    /// # Errors
    ///
    /// `PlatformError::Authentication` when the platform rejects the login.
    async fn login(&mut self, account: &str, secret: Option<&SecretString>) -> Result<()>;

    /// Lightweight call proving the session really belongs to `account`
    async fn verify_identity(&self, account: &str) -> Result<()>;

    /// # Errors
    ///
    /// `PlatformError::LoginRequired` when the session was invalidated,
    /// `PlatformError::Upload` / `PlatformError::Network` on transient failures.
    async fn upload_image(&self, path: &Path, caption: &str) -> Result<String>;

    async fn upload_video(&self, path: &Path, caption: &str) -> Result<String>;

    async fn upload_reel(&self, path: &Path, caption: &str) -> Result<String>;

    async fn upload_story(&self, path: &Path, kind: MediaKind) -> Result<String>;

    async fn upload_album(&self, paths: &[PathBuf], caption: &str) -> Result<String>;
}

/// Source of fresh, unauthenticated clients
pub trait ClientFactory: Send + Sync {
    fn new_client(&self, device: &DeviceFingerprint) -> Box<dyn PlatformClient>;
}

//! Account session management
//!
//! Turns an account (plus an optional password) into an authenticated
//! [`PlatformClient`], reusing the saved session whenever the platform still
//! accepts it. Credential logins for one account are serialized across
//! processes by the per-account lock from [`crate::lock`].
//!
//! Every client is created with the same [`DeviceFingerprint`]. The platform
//! ties session validity to the device a session was issued to, so rotating
//! it would invalidate sessions that are otherwise fine.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PlatformError, Result, SessionError};
use crate::lock::{LockManager, LockSettings};
use crate::platforms::{ClientFactory, PlatformClient};
use crate::store::write_atomic;
use crate::types::validate_account;

/// Simulated device identity presented on every login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub manufacturer: String,
    pub model: String,
    pub android_version: u32,
    pub android_release: String,
}

impl DeviceFingerprint {
    /// The one fingerprint used for all accounts
    pub fn stable() -> Self {
        Self {
            manufacturer: "Samsung".to_string(),
            model: "SM-G973F".to_string(),
            android_version: 29,
            android_release: "10".to_string(),
        }
    }
}

/// On-disk session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub account: String,
    pub device: DeviceFingerprint,
    pub state: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

/// Knobs for [`SessionManager::login_with_options`]
#[derive(Debug, Clone, Copy)]
pub struct LoginOptions {
    /// Return a still-valid saved session instead of logging in
    pub reuse_session: bool,
    /// Persist the session produced by a credential login
    pub trust_session: bool,
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self {
            reuse_session: true,
            trust_session: true,
        }
    }
}

pub struct SessionManager {
    factory: Arc<dyn ClientFactory>,
    sessions_dir: PathBuf,
    locks: LockManager,
    device: DeviceFingerprint,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn ClientFactory>, sessions_dir: PathBuf, locks: LockManager) -> Self {
        Self {
            factory,
            sessions_dir,
            locks,
            device: DeviceFingerprint::stable(),
        }
    }

    pub fn from_config(factory: Arc<dyn ClientFactory>, config: &Config) -> Self {
        Self::new(
            factory,
            config.sessions_dir(),
            LockManager::new(LockSettings::from(config)),
        )
    }

    pub fn session_path(&self, account: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", account))
    }

    /// Resume the saved session for `account`
    ///
    /// Returns `None` when there is no usable session: missing or corrupt
    /// file, a different device fingerprint, or the platform rejecting it.
    /// The file is left in place in every case.
    pub async fn load_session(&self, account: &str) -> Option<Box<dyn PlatformClient>> {
        if validate_account(account).is_err() {
            return None;
        }
        let path = self.session_path(account);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(account, "No saved session");
                return None;
            }
            Err(e) => {
                warn!(account, "Failed to read session file: {}", e);
                return None;
            }
        };

        let saved: SessionFile = match serde_json::from_str(&content) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(account, "Corrupt session file: {}", e);
                return None;
            }
        };

        if saved.device != self.device {
            warn!(account, "Saved session was issued to a different device, ignoring it");
            return None;
        }

        // Device first, then the session state issued against it
        let mut client = self.factory.new_client(&self.device);
        match resume(client.as_mut(), account, &saved.state).await {
            Ok(()) => {
                info!(account, "Session reused");
                Some(client)
            }
            Err(e) => {
                warn!(account, "Session reuse failed: {}", e);
                None
            }
        }
    }

    /// Session first; full credential login only when no session works
    pub async fn login_with_password(
        &self,
        account: &str,
        secret: &SecretString,
    ) -> Result<Box<dyn PlatformClient>> {
        self.login_with_options(account, secret, LoginOptions::default())
            .await
    }

    /// Credential login that skips session reuse, for when the platform has
    /// just rejected the current session
    pub async fn force_login(
        &self,
        account: &str,
        secret: &SecretString,
    ) -> Result<Box<dyn PlatformClient>> {
        self.login_with_options(
            account,
            secret,
            LoginOptions {
                reuse_session: false,
                ..LoginOptions::default()
            },
        )
        .await
    }

    pub async fn login_with_options(
        &self,
        account: &str,
        secret: &SecretString,
        options: LoginOptions,
    ) -> Result<Box<dyn PlatformClient>> {
        validate_account(account)?;

        let seen = self.session_stamp(account);
        if options.reuse_session {
            if let Some(client) = self.load_session(account).await {
                return Ok(client);
            }
        }

        let _guard = self.locks.acquire(account).await?;

        // Whoever held the lock before us may have just saved a fresh session
        if options.reuse_session && self.session_stamp(account) != seen {
            if let Some(client) = self.load_session(account).await {
                return Ok(client);
            }
        }

        let mut client = self.factory.new_client(&self.device);
        client.login(account, Some(secret)).await?;
        client.verify_identity(account).await?;

        if options.trust_session {
            self.save_session(account, client.as_ref())?;
        }

        info!(account, "Password login successful");
        Ok(client)
    }

    /// Client for `account`: saved session, else password login, else an
    /// authentication error
    ///
    /// With a password the session attempt happens inside
    /// [`login_with_password`](Self::login_with_password), so a stale session
    /// is tried once, not twice.
    pub async fn client_for(
        &self,
        account: &str,
        secret: Option<&SecretString>,
    ) -> Result<Box<dyn PlatformClient>> {
        if let Some(secret) = secret {
            return self.login_with_password(account, secret).await;
        }

        match self.load_session(account).await {
            Some(client) => Ok(client),
            None => Err(PlatformError::Authentication(format!(
                "No session found for {} and no password provided",
                account
            ))
            .into()),
        }
    }

    /// Modification time of the session file, `None` when there is none
    fn session_stamp(&self, account: &str) -> Option<SystemTime> {
        std::fs::metadata(self.session_path(account))
            .and_then(|meta| meta.modified())
            .ok()
    }

    pub fn save_session(&self, account: &str, client: &dyn PlatformClient) -> Result<()> {
        let record = SessionFile {
            account: account.to_string(),
            device: client.device().clone(),
            state: client.session_state()?,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(SessionError::Encode)?;
        let path = self.session_path(account);
        write_atomic(&path, &json).map_err(SessionError::Io)?;

        debug!(account, path = %path.display(), "Session saved");
        Ok(())
    }
}

async fn resume(
    client: &mut dyn PlatformClient,
    account: &str,
    state: &serde_json::Value,
) -> Result<()> {
    client.restore_session(state)?;
    client.login(account, None).await?;
    client.verify_identity(account).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockConfig, MockPlatform};
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, platform: &MockPlatform) -> SessionManager {
        SessionManager::new(
            Arc::new(platform.clone()),
            dir.path().join("sessions"),
            LockManager::new(LockSettings {
                timeout: Duration::from_millis(500),
                poll_interval: Duration::from_millis(20),
                ..LockSettings::new(dir.path().join("locks"))
            }),
        )
    }

    fn secret() -> SecretString {
        SecretString::from("pw".to_string())
    }

    #[tokio::test]
    async fn test_load_session_without_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);

        assert!(sessions.load_session("acct1").await.is_none());

        sessions.login_with_password("acct1", &secret()).await.unwrap();
        assert_eq!(platform.credential_login_count(), 1);
        assert!(sessions.session_path("acct1").exists());
    }

    #[tokio::test]
    async fn test_valid_session_skips_credential_login() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);

        sessions.login_with_password("acct1", &secret()).await.unwrap();
        sessions.login_with_password("acct1", &secret()).await.unwrap();
        sessions.login_with_password("acct1", &secret()).await.unwrap();

        assert_eq!(platform.credential_login_count(), 1);
        assert_eq!(platform.session_login_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_session_keeps_file_and_falls_back() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        sessions.login_with_password("acct1", &secret()).await.unwrap();

        platform.invalidate_sessions();

        assert!(sessions.load_session("acct1").await.is_none());
        assert!(sessions.session_path("acct1").exists());

        sessions.login_with_password("acct1", &secret()).await.unwrap();
        assert_eq!(platform.credential_login_count(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_session_file_is_not_deleted() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        std::fs::create_dir_all(dir.path().join("sessions")).unwrap();
        std::fs::write(sessions.session_path("acct1"), "{garbage").unwrap();

        assert!(sessions.load_session("acct1").await.is_none());
        assert_eq!(
            std::fs::read_to_string(sessions.session_path("acct1")).unwrap(),
            "{garbage"
        );
    }

    #[tokio::test]
    async fn test_session_from_other_device_is_ignored() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        sessions.login_with_password("acct1", &secret()).await.unwrap();

        let path = sessions.session_path("acct1");
        let mut saved: SessionFile =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        saved.device.model = "Pixel 7".to_string();
        std::fs::write(&path, serde_json::to_string(&saved).unwrap()).unwrap();

        assert!(sessions.load_session("acct1").await.is_none());
    }

    #[tokio::test]
    async fn test_every_client_uses_stable_device() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);

        sessions.login_with_password("acct1", &secret()).await.unwrap();
        sessions.login_with_password("acct2", &secret()).await.unwrap();
        sessions.load_session("acct1").await.unwrap();

        let devices = platform.devices_seen();
        assert!(!devices.is_empty());
        assert!(devices.iter().all(|d| *d == DeviceFingerprint::stable()));
    }

    #[tokio::test]
    async fn test_force_login_bypasses_session() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        sessions.login_with_password("acct1", &secret()).await.unwrap();

        sessions.force_login("acct1", &secret()).await.unwrap();

        assert_eq!(platform.credential_login_count(), 2);
        assert_eq!(platform.session_login_count(), 0);
    }

    #[tokio::test]
    async fn test_untrusted_login_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);

        sessions
            .login_with_options(
                "acct1",
                &secret(),
                LoginOptions {
                    trust_session: false,
                    ..LoginOptions::default()
                },
            )
            .await
            .unwrap();

        assert!(!sessions.session_path("acct1").exists());
    }

    #[tokio::test]
    async fn test_failed_login_releases_lock() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::new(MockConfig {
            accepted_secret: Some("right".to_string()),
            ..Default::default()
        });
        let sessions = manager(&dir, &platform);

        assert!(sessions.login_with_password("acct1", &secret()).await.is_err());
        assert!(!dir.path().join("locks").join("acct1.lock").exists());

        let right = SecretString::from("right".to_string());
        assert!(sessions.login_with_password("acct1", &right).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_held_elsewhere_is_busy_error() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        let other = LockManager::new(LockSettings::new(dir.path().join("locks")));
        let _held = other.try_acquire("acct1").unwrap().unwrap();

        let err = sessions
            .login_with_password("acct1", &secret())
            .await
            .err()
            .unwrap();

        assert!(err.is_lock_busy());
        assert_eq!(platform.credential_login_count(), 0);
    }

    #[tokio::test]
    async fn test_client_for_tries_stale_session_once() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        sessions.login_with_password("acct1", &secret()).await.unwrap();
        platform.invalidate_sessions();
        let before = platform.devices_seen().len();

        sessions.client_for("acct1", Some(&secret())).await.unwrap();

        // One rejected resume, one credential login
        assert_eq!(platform.devices_seen().len() - before, 2);
        assert_eq!(platform.credential_login_count(), 2);
        assert_eq!(platform.session_login_count(), 0);
    }

    #[tokio::test]
    async fn test_client_for_reuses_valid_session() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);
        sessions.login_with_password("acct1", &secret()).await.unwrap();

        sessions.client_for("acct1", None).await.unwrap();
        sessions.client_for("acct1", Some(&secret())).await.unwrap();

        assert_eq!(platform.credential_login_count(), 1);
        assert_eq!(platform.session_login_count(), 2);
    }

    #[tokio::test]
    async fn test_client_for_without_session_or_secret() {
        let dir = TempDir::new().unwrap();
        let platform = MockPlatform::default();
        let sessions = manager(&dir, &platform);

        let err = sessions.client_for("acct1", None).await.err().unwrap();
        assert!(err.to_string().contains("no password provided"));
    }
}

//! Mock platform implementation for testing
//!
//! A configurable in-memory platform: it issues session ids on credential
//! login, accepts them on session login until invalidated, and replays a
//! script of upload outcomes. Counters expose how often each path ran so tests
//! can assert on session reuse and login exclusivity.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::media::MediaKind;
use crate::platforms::{ClientFactory, PlatformClient};
use crate::session::DeviceFingerprint;

/// Configuration for mock platform behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Only this password is accepted when set; any password otherwise
    pub accepted_secret: Option<String>,

    /// Time a credential login takes (simulates network latency)
    pub login_delay: Duration,

    /// Time each upload call takes
    pub upload_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Video,
    Reel,
    Story,
    Album,
}

/// A successful upload seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct MockUpload {
    pub account: String,
    pub kind: UploadKind,
    pub paths: Vec<PathBuf>,
    pub caption: String,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: usize,
    valid_sessions: HashSet<String>,
    credential_logins: usize,
    session_logins: usize,
    active_credential_logins: usize,
    max_concurrent_credential_logins: usize,
    upload_attempts: usize,
    upload_script: VecDeque<std::result::Result<String, PlatformError>>,
    uploads: Vec<MockUpload>,
    devices: Vec<DeviceFingerprint>,
}

/// Mock platform for testing; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Mock platform whose credential logins take `delay`
    pub fn with_login_delay(delay: Duration) -> Self {
        Self::new(MockConfig {
            login_delay: delay,
            ..Default::default()
        })
    }

    /// Queue outcomes for the next upload calls; unscripted calls succeed
    pub fn script_uploads<I>(&self, outcomes: I)
    where
        I: IntoIterator<Item = std::result::Result<String, PlatformError>>,
    {
        self.state.lock().unwrap().upload_script.extend(outcomes);
    }

    /// Expire every issued session, as the platform does on a forced logout
    pub fn invalidate_sessions(&self) {
        self.state.lock().unwrap().valid_sessions.clear();
    }

    pub fn credential_login_count(&self) -> usize {
        self.state.lock().unwrap().credential_logins
    }

    pub fn session_login_count(&self) -> usize {
        self.state.lock().unwrap().session_logins
    }

    pub fn max_concurrent_credential_logins(&self) -> usize {
        self.state.lock().unwrap().max_concurrent_credential_logins
    }

    pub fn upload_attempts(&self) -> usize {
        self.state.lock().unwrap().upload_attempts
    }

    pub fn uploads(&self) -> Vec<MockUpload> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Devices every created client was primed with
    pub fn devices_seen(&self) -> Vec<DeviceFingerprint> {
        self.state.lock().unwrap().devices.clone()
    }
}

impl ClientFactory for MockPlatform {
    fn new_client(&self, device: &DeviceFingerprint) -> Box<dyn PlatformClient> {
        self.state.lock().unwrap().devices.push(device.clone());
        Box::new(MockClient {
            device: device.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            account: None,
            session_id: None,
        })
    }
}

struct MockClient {
    device: DeviceFingerprint,
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
    account: Option<String>,
    session_id: Option<String>,
}

impl MockClient {
    fn session_valid(&self) -> bool {
        match &self.session_id {
            Some(id) => self.state.lock().unwrap().valid_sessions.contains(id),
            None => false,
        }
    }

    async fn upload(&self, kind: UploadKind, paths: Vec<PathBuf>, caption: &str) -> Result<String> {
        if !self.config.upload_delay.is_zero() {
            sleep(self.config.upload_delay).await;
        }

        let valid = self.session_valid();
        let mut state = self.state.lock().unwrap();
        state.upload_attempts += 1;

        if !valid {
            return Err(PlatformError::LoginRequired("mock session expired".to_string()).into());
        }

        let outcome = state.upload_script.pop_front();
        match outcome {
            Some(Err(e)) => Err(e.into()),
            scripted => {
                state.next_id += 1;
                let media_id = match scripted {
                    Some(Ok(id)) => id,
                    _ => format!("mock-media-{}", state.next_id),
                };
                state.uploads.push(MockUpload {
                    account: self.account.clone().unwrap_or_default(),
                    kind,
                    paths,
                    caption: caption.to_string(),
                });
                Ok(media_id)
            }
        }
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn device(&self) -> &DeviceFingerprint {
        &self.device
    }

    fn restore_session(&mut self, state: &serde_json::Value) -> Result<()> {
        let session_id = state
            .get("sessionid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlatformError::Authentication("session state has no sessionid".to_string()))?;
        self.session_id = Some(session_id.to_string());
        Ok(())
    }

    fn session_state(&self) -> Result<serde_json::Value> {
        let session_id = self
            .session_id
            .as_ref()
            .ok_or_else(|| PlatformError::Authentication("client is not logged in".to_string()))?;
        Ok(serde_json::json!({
            "sessionid": session_id,
            "account": self.account,
        }))
    }

    async fn login(&mut self, account: &str, secret: Option<&SecretString>) -> Result<()> {
        let Some(secret) = secret else {
            if !self.session_valid() {
                return Err(PlatformError::Authentication("session rejected".to_string()).into());
            }
            self.state.lock().unwrap().session_logins += 1;
            self.account = Some(account.to_string());
            return Ok(());
        };

        {
            let mut state = self.state.lock().unwrap();
            state.active_credential_logins += 1;
            state.max_concurrent_credential_logins = state
                .max_concurrent_credential_logins
                .max(state.active_credential_logins);
        }

        if !self.config.login_delay.is_zero() {
            sleep(self.config.login_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.active_credential_logins -= 1;
        state.credential_logins += 1;

        if let Some(expected) = &self.config.accepted_secret {
            if secret.expose_secret() != expected.as_str() {
                return Err(PlatformError::Authentication("bad password".to_string()).into());
            }
        }

        state.next_id += 1;
        let session_id = format!("mock-session-{}-{}", account, state.next_id);
        state.valid_sessions.insert(session_id.clone());
        self.session_id = Some(session_id);
        self.account = Some(account.to_string());
        Ok(())
    }

    async fn verify_identity(&self, account: &str) -> Result<()> {
        if !self.session_valid() {
            return Err(PlatformError::LoginRequired("mock session expired".to_string()).into());
        }
        if self.account.as_deref() != Some(account) {
            return Err(PlatformError::Authentication(format!(
                "session belongs to {:?}, not {}",
                self.account, account
            ))
            .into());
        }
        Ok(())
    }

    async fn upload_image(&self, path: &Path, caption: &str) -> Result<String> {
        self.upload(UploadKind::Image, vec![path.to_path_buf()], caption).await
    }

    async fn upload_video(&self, path: &Path, caption: &str) -> Result<String> {
        self.upload(UploadKind::Video, vec![path.to_path_buf()], caption).await
    }

    async fn upload_reel(&self, path: &Path, caption: &str) -> Result<String> {
        self.upload(UploadKind::Reel, vec![path.to_path_buf()], caption).await
    }

    async fn upload_story(&self, path: &Path, _kind: MediaKind) -> Result<String> {
        self.upload(UploadKind::Story, vec![path.to_path_buf()], "").await
    }

    async fn upload_album(&self, paths: &[PathBuf], caption: &str) -> Result<String> {
        self.upload(UploadKind::Album, paths.to_vec(), caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceFingerprint {
        DeviceFingerprint::stable()
    }

    #[tokio::test]
    async fn test_credential_login_issues_reusable_session() {
        let platform = MockPlatform::default();
        let mut client = platform.new_client(&device());
        let secret = SecretString::from("pw".to_string());

        client.login("acct1", Some(&secret)).await.unwrap();
        let state = client.session_state().unwrap();

        let mut resumed = platform.new_client(&device());
        resumed.restore_session(&state).unwrap();
        resumed.login("acct1", None).await.unwrap();
        resumed.verify_identity("acct1").await.unwrap();

        assert_eq!(platform.credential_login_count(), 1);
        assert_eq!(platform.session_login_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidated_session_requires_login() {
        let platform = MockPlatform::default();
        let mut client = platform.new_client(&device());
        client
            .login("acct1", Some(&SecretString::from("pw".to_string())))
            .await
            .unwrap();

        platform.invalidate_sessions();

        let err = client.upload_image(Path::new("a.jpg"), "").await.unwrap_err();
        assert!(err.is_login_required());
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let platform = MockPlatform::new(MockConfig {
            accepted_secret: Some("right".to_string()),
            ..Default::default()
        });
        let mut client = platform.new_client(&device());

        let result = client
            .login("acct1", Some(&SecretString::from("wrong".to_string())))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scripted_uploads_replay_in_order() {
        let platform = MockPlatform::default();
        platform.script_uploads([
            Err(PlatformError::Network("reset".to_string())),
            Ok("media-42".to_string()),
        ]);
        let mut client = platform.new_client(&device());
        client
            .login("acct1", Some(&SecretString::from("pw".to_string())))
            .await
            .unwrap();

        assert!(client.upload_image(Path::new("a.jpg"), "hi").await.is_err());
        assert_eq!(client.upload_image(Path::new("a.jpg"), "hi").await.unwrap(), "media-42");
        assert_eq!(platform.upload_attempts(), 2);
        assert_eq!(platform.uploads().len(), 1);
        assert_eq!(platform.uploads()[0].caption, "hi");
    }
}

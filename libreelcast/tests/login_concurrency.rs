//! Concurrent login tests
//!
//! Each caller gets its own SessionManager over the same session and lock
//! directories, the way two processes sharing an account would.

use anyhow::Result;
use libreelcast::lock::{LockManager, LockSettings};
use libreelcast::platforms::mock::MockPlatform;
use libreelcast::SessionManager;
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn manager(platform: &MockPlatform, dir: &Path, lock_timeout: Duration) -> Arc<SessionManager> {
    let locks = LockManager::new(LockSettings {
        timeout: lock_timeout,
        poll_interval: Duration::from_millis(20),
        ..LockSettings::new(dir.join("locks"))
    });
    Arc::new(SessionManager::new(
        Arc::new(platform.clone()),
        dir.join("sessions"),
        locks,
    ))
}

fn secret() -> SecretString {
    SecretString::from("pw".to_string())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_logins_share_one_credential_login() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let platform = MockPlatform::with_login_delay(Duration::from_millis(200));
    let first = manager(&platform, temp_dir.path(), Duration::from_secs(5));
    let second = manager(&platform, temp_dir.path(), Duration::from_secs(5));

    let a = tokio::spawn(async move {
        first
            .login_with_password("acct1", &secret())
            .await
            .map(|_| ())
    });
    let b = tokio::spawn(async move {
        second
            .login_with_password("acct1", &secret())
            .await
            .map(|_| ())
    });

    a.await??;
    b.await??;

    assert_eq!(platform.credential_login_count(), 1);
    assert_eq!(platform.session_login_count(), 1);
    assert_eq!(platform.max_concurrent_credential_logins(), 1);
    assert!(!temp_dir.path().join("locks").join("acct1.lock").exists());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_waiter_gives_up_with_lock_busy() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let platform = MockPlatform::with_login_delay(Duration::from_millis(600));
    let slow = manager(&platform, temp_dir.path(), Duration::from_secs(5));
    let impatient = manager(&platform, temp_dir.path(), Duration::from_millis(100));

    let holder = tokio::spawn(async move {
        slow.login_with_password("acct1", &secret())
            .await
            .map(|_| ())
    });
    // Let the first caller take the lock
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = impatient
        .login_with_password("acct1", &secret())
        .await
        .err()
        .expect("second login should time out");

    assert!(err.is_lock_busy());
    holder.await??;
    assert_eq!(platform.credential_login_count(), 1);
    assert_eq!(platform.max_concurrent_credential_logins(), 1);

    Ok(())
}

#[tokio::test]
async fn test_different_accounts_do_not_block_each_other() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let platform = MockPlatform::with_login_delay(Duration::from_millis(100));
    let sessions = manager(&platform, temp_dir.path(), Duration::from_millis(50));

    let secret1 = secret();
    let secret2 = secret();
    let (a, b) = tokio::join!(
        sessions.login_with_password("acct1", &secret1),
        sessions.login_with_password("acct2", &secret2),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(platform.credential_login_count(), 2);
    assert_eq!(platform.max_concurrent_credential_logins(), 2);

    Ok(())
}

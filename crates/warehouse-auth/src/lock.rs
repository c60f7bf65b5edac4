//! Process-wide single-authentication lock (spec §4.3, §9 "Global mutable
//! state"). Interactive authenticators (OAuth authorization code, SAML)
//! acquire this before opening a browser/starting the loopback listener so
//! two concurrent `login()` calls don't spawn two browser prompts.

use std::sync::OnceLock;

use tokio::sync::Mutex;

static SINGLE_AUTH_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn lock() -> &'static Mutex<()> {
    SINGLE_AUTH_LOCK.get_or_init(|| Mutex::new(()))
}

/// Guards the interactive portion of an authenticator's flow. A no-op
/// pass-through when `enabled` is false (spec: "Honored only when
/// `singleAuthenticationPrompt` is enabled").
pub async fn acquire_if_enabled(enabled: bool) -> Option<tokio::sync::MutexGuard<'static, ()>> {
    if enabled {
        Some(lock().lock().await)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_first_to_drop() {
        let guard1 = acquire_if_enabled(true).await;
        assert!(guard1.is_some());

        let acquired_second = std::sync::Arc::new(tokio::sync::Notify::new());
        let acquired_second2 = acquired_second.clone();
        let handle = tokio::spawn(async move {
            let _guard2 = acquire_if_enabled(true).await;
            acquired_second2.notify_one();
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(guard1);
        tokio::time::timeout(std::time::Duration::from_secs(1), acquired_second.notified())
            .await
            .expect("second acquirer should proceed after first drops the lock");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn disabled_lock_never_blocks() {
        assert!(acquire_if_enabled(false).await.is_none());
        assert!(acquire_if_enabled(false).await.is_none());
    }
}

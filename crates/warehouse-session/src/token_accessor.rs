//! `TokenAccessor` (spec §4.1 Component B, §5): the session's token triple
//! guarded by an `RwLock` for cheap concurrent reads, plus a separate
//! refresh mutex so only one renewal is ever in flight even if several
//! callers notice an expired token at once.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use warehouse_core::domain::{TokenTriple, WarehouseError};

pub struct TokenAccessor {
    tokens: RwLock<TokenTriple>,
    refresh_lock: Mutex<()>,
}

impl TokenAccessor {
    pub fn new(tokens: TokenTriple) -> Arc<Self> {
        Arc::new(Self {
            tokens: RwLock::new(tokens),
            refresh_lock: Mutex::new(()),
        })
    }

    pub async fn session_token(&self) -> String {
        self.tokens.read().await.session_token.reveal().to_string()
    }

    pub async fn master_token(&self) -> String {
        self.tokens.read().await.master_token.reveal().to_string()
    }

    pub async fn is_expired(&self) -> bool {
        self.tokens.read().await.is_expired_at(chrono::Utc::now())
    }

    /// Replaces the token triple after a successful renewal or login.
    pub async fn set(&self, tokens: TokenTriple) {
        *self.tokens.write().await = tokens;
    }

    /// Runs `renew` under the refresh lock, so a concurrent caller that
    /// also observed an expired token waits for this renewal instead of
    /// racing a second one (spec §5, Open Question (ii)).
    pub async fn refresh_with<F, Fut>(&self, renew: F) -> Result<(), WarehouseError>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<TokenTriple, WarehouseError>>,
    {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have already refreshed while we waited for
        // the lock; skip re-renewing if the token is no longer expired.
        if !self.is_expired().await {
            debug!("token already refreshed by a concurrent caller, skipping renewal");
            return Ok(());
        }

        let master_token = self.master_token().await;
        info!("renewing session token");
        let renewed = renew(master_token).await?;
        self.set(renewed).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::newtypes::SecretToken;

    fn tokens(ttl_secs: i64) -> TokenTriple {
        TokenTriple::new(
            SecretToken::new("session").unwrap(),
            SecretToken::new("master").unwrap(),
            None,
            chrono::Duration::seconds(ttl_secs),
        )
    }

    #[tokio::test]
    async fn set_replaces_tokens() {
        let accessor = TokenAccessor::new(tokens(3600));
        assert_eq!(accessor.session_token().await, "session");
        accessor.set(tokens(7200)).await;
        accessor.set(
            TokenTriple::new(
                SecretToken::new("new-session").unwrap(),
                SecretToken::new("new-master").unwrap(),
                None,
                chrono::Duration::seconds(3600),
            ),
        )
        .await;
        assert_eq!(accessor.session_token().await, "new-session");
    }

    #[tokio::test]
    async fn refresh_with_skips_if_already_fresh() {
        let accessor = TokenAccessor::new(tokens(3600));
        let called = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let called2 = called.clone();
        accessor
            .refresh_with(|_master| {
                called2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move { Ok(tokens(3600)) }
            })
            .await
            .unwrap();
        assert_eq!(called.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_with_renews_when_expired() {
        let accessor = TokenAccessor::new(tokens(-10));
        accessor
            .refresh_with(|_master| async move { Ok(tokens(3600)) })
            .await
            .unwrap();
        assert!(!accessor.is_expired().await);
    }
}

//! Heartbeat: a background task that keeps a session's master token fresh
//! so it never expires out from under an idle connection (spec §4.1
//! Component D, Open Question (ii): the session, not each caller, owns
//! renewal).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use warehouse_core::domain::WarehouseError;
use warehouse_core::ports::ICloudSession;

use crate::token_accessor::TokenAccessor;

/// Renewal is attempted this often regardless of the token's remaining
/// TTL, matching the warehouse server's recommended heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60 * 30);

pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawns the single interval loop that renews `tokens` through
    /// `session` for as long as the returned handle is held.
    pub fn spawn(session: Arc<dyn ICloudSession>, tokens: Arc<TokenAccessor>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await; // first tick fires immediately, skip it
            loop {
                interval.tick().await;
                if let Err(err) = Self::renew_once(&session, &tokens).await {
                    warn!(%err, "heartbeat renewal failed, will retry next interval");
                } else {
                    debug!("heartbeat renewed session token");
                }
            }
        });
        Self { handle }
    }

    async fn renew_once(
        session: &Arc<dyn ICloudSession>,
        tokens: &Arc<TokenAccessor>,
    ) -> Result<(), WarehouseError> {
        let session = session.clone();
        tokens
            .refresh_with(move |master_token| {
                let session = session.clone();
                async move { session.renew(&master_token).await }
            })
            .await
    }

    /// Stops the background loop. Dropping a `Heartbeat` without calling
    /// this also aborts it, but callers that want an explicit shutdown
    /// point (e.g. before `ICloudSession::close`) should call it.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warehouse_core::config::Config;
    use warehouse_core::domain::newtypes::SecretToken;
    use warehouse_core::domain::{QueryContextCache, ResultDescriptor, TokenTriple};
    use warehouse_core::ports::{LoginOutcome, SubmitOutcome};

    struct CountingSession {
        renewals: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ICloudSession for CountingSession {
        async fn login(&self, _config: &Config) -> Result<LoginOutcome, WarehouseError> {
            unimplemented!()
        }
        async fn renew(&self, _master_token: &str) -> Result<TokenTriple, WarehouseError> {
            self.renewals.fetch_add(1, Ordering::SeqCst);
            Ok(TokenTriple::new(
                SecretToken::new("session").unwrap(),
                SecretToken::new("master").unwrap(),
                None,
                chrono::Duration::seconds(3600),
            ))
        }
        async fn close(&self) -> Result<(), WarehouseError> {
            Ok(())
        }
        async fn submit(
            &self,
            _sql: &str,
            _context_cache: &QueryContextCache,
            _multi_statement_count: Option<u32>,
        ) -> Result<SubmitOutcome, WarehouseError> {
            unimplemented!()
        }
        async fn poll(&self, _query_id: &str) -> Result<SubmitOutcome, WarehouseError> {
            unimplemented!()
        }
        async fn query_status(
            &self,
            _query_id: &str,
        ) -> Result<warehouse_core::domain::QueryStatus, WarehouseError> {
            unimplemented!()
        }
        async fn cancel(&self, _query_id: &str) -> Result<(), WarehouseError> {
            Ok(())
        }
        async fn renew_chunk_urls(&self, _query_id: &str) -> Result<ResultDescriptor, WarehouseError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn renew_once_skips_when_token_still_fresh() {
        let session: Arc<dyn ICloudSession> = Arc::new(CountingSession {
            renewals: Arc::new(AtomicUsize::new(0)),
        });
        let tokens = TokenAccessor::new(TokenTriple::new(
            SecretToken::new("session").unwrap(),
            SecretToken::new("master").unwrap(),
            None,
            chrono::Duration::seconds(3600),
        ));
        Heartbeat::renew_once(&session, &tokens).await.unwrap();
        assert!(!tokens.is_expired().await);
    }
}

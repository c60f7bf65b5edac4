//! `QueryExecutor` (spec §4.1 Component E): submit → interpret → poll loop,
//! multi-statement chaining, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warehouse_core::domain::{QueryContextCache, ResultDescriptor, WarehouseError};
use warehouse_core::ports::{ICloudSession, SubmitOutcome};

/// Implementation-defined ceiling for indefinite polling with no caller
/// deadline (spec Open Question (i)).
const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(600);

const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(500);
const INITIAL_FAST_POLLS: u32 = 3;
const POLL_BACKOFF_MULTIPLIER: f64 = 2.0;
const POLL_CEILING: Duration = Duration::from_secs(5);

pub struct QueryExecutor {
    session: Arc<dyn ICloudSession>,
    context_cache: Mutex<QueryContextCache>,
}

pub struct ExecuteOutcome {
    pub descriptors: Vec<ResultDescriptor>,
}

impl QueryExecutor {
    pub fn new(session: Arc<dyn ICloudSession>, context_cache: QueryContextCache) -> Self {
        Self {
            session,
            context_cache: Mutex::new(context_cache),
        }
    }

    /// Submits `sql`, polls until a terminal outcome (or `deadline`
    /// elapses), and follows `statementHandles` chaining for
    /// multi-statement submissions (spec §4.1).
    pub async fn execute(
        &self,
        sql: &str,
        multi_statement_count: Option<u32>,
        deadline: Option<Duration>,
        cancellation: CancellationToken,
    ) -> Result<ExecuteOutcome, WarehouseError> {
        let deadline = deadline.unwrap_or(DEFAULT_POLL_DEADLINE);
        let started = std::time::Instant::now();

        let first = {
            let cache = self.context_cache.lock().await;
            self.session.submit(sql, &cache, multi_statement_count).await?
        };

        let mut descriptor = match self.await_terminal(first, started, deadline, &cancellation).await? {
            Some(d) => d,
            None => {
                return Err(WarehouseError::QueryCancelled {
                    query_id: "unknown".to_string(),
                })
            }
        };

        let mut descriptors = Vec::new();
        let mut index = 0usize;
        loop {
            let has_more = descriptor.has_more_statements(index);
            descriptors.push(descriptor.clone());
            if !has_more {
                break;
            }
            index += 1;
            let next_id = descriptor.statement_handles[index].clone();
            info!(query_id = %next_id, "following multi-statement chain");
            let outcome = self.session.poll(next_id.as_str()).await?;
            descriptor = match self.await_terminal(outcome, started, deadline, &cancellation).await? {
                Some(d) => d,
                None => {
                    return Err(WarehouseError::QueryCancelled {
                        query_id: next_id.as_str().to_string(),
                    })
                }
            };
        }

        Ok(ExecuteOutcome { descriptors })
    }

    /// Polls `first` until terminal, applying the 500ms×3-then-backoff
    /// schedule, honoring `deadline` and `cancellation` (spec §4.1/§5
    /// cancellation semantics: stop polling, background abort with a 1s
    /// timeout, return a cancellation error).
    async fn await_terminal(
        &self,
        mut outcome: SubmitOutcome,
        started: std::time::Instant,
        deadline: Duration,
        cancellation: &CancellationToken,
    ) -> Result<Option<ResultDescriptor>, WarehouseError> {
        let mut poll_count = 0u32;
        let mut interval = INITIAL_POLL_INTERVAL;

        loop {
            match outcome {
                SubmitOutcome::Completed(descriptor) => return Ok(Some(descriptor)),
                SubmitOutcome::Failed(err) => return Err(err),
                SubmitOutcome::StillRunning { query_id } => {
                    if started.elapsed() >= deadline {
                        warn!(query_id, "poll deadline reached");
                        return Err(WarehouseError::QueryStillRunning { query_id });
                    }

                    let sleep = tokio::time::sleep(interval);
                    tokio::select! {
                        _ = sleep => {}
                        _ = cancellation.cancelled() => {
                            self.abort_in_background(query_id);
                            return Ok(None);
                        }
                    }

                    poll_count += 1;
                    if poll_count >= INITIAL_FAST_POLLS {
                        interval = std::cmp::min(
                            Duration::from_secs_f64(interval.as_secs_f64() * POLL_BACKOFF_MULTIPLIER),
                            POLL_CEILING,
                        );
                    }

                    outcome = self.session.poll(&query_id).await?;
                }
            }
        }
    }

    /// Fires a best-effort cancel request with a 1s timeout and does not
    /// propagate its result; the caller has already given up on the query
    /// (spec §4.1/§5 "background abort with 1s timeout").
    fn abort_in_background(&self, query_id: String) {
        let session = self.session.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(Duration::from_secs(1), session.cancel(&query_id)).await;
            match result {
                Ok(Ok(())) => debug!(query_id, "background abort completed"),
                Ok(Err(err)) => warn!(query_id, %err, "background abort failed"),
                Err(_) => warn!(query_id, "background abort timed out"),
            }
        });
    }

    pub async fn merge_context(&self, entries: impl IntoIterator<Item = warehouse_core::domain::QueryContextEntry>) {
        self.context_cache.lock().await.merge_all(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warehouse_core::config::Config;
    use warehouse_core::domain::{QueryId, ResultFormat, TokenTriple};
    use warehouse_core::ports::LoginOutcome;

    struct FakeSession {
        poll_calls: AtomicUsize,
        terminal_after: usize,
    }

    fn descriptor(id: &str) -> ResultDescriptor {
        ResultDescriptor {
            query_id: QueryId::new(id).unwrap(),
            columns: vec![],
            inline_rows: vec![],
            chunks: vec![],
            format: ResultFormat::JsonRowSet,
            qrmk: None,
            total_row_count: 0,
            sql_state: None,
            statement_handles: vec![],
        }
    }

    #[async_trait]
    impl ICloudSession for FakeSession {
        async fn login(&self, _config: &Config) -> Result<LoginOutcome, WarehouseError> {
            unimplemented!()
        }
        async fn renew(&self, _master_token: &str) -> Result<TokenTriple, WarehouseError> {
            unimplemented!()
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
            Ok(SubmitOutcome::StillRunning {
                query_id: "q1".to_string(),
            })
        }
        async fn poll(&self, query_id: &str) -> Result<SubmitOutcome, WarehouseError> {
            let count = self.poll_calls.fetch_add(1, Ordering::SeqCst);
            if count + 1 >= self.terminal_after {
                Ok(SubmitOutcome::Completed(descriptor(query_id)))
            } else {
                Ok(SubmitOutcome::StillRunning {
                    query_id: query_id.to_string(),
                })
            }
        }
        async fn query_status(&self, query_id: &str) -> Result<warehouse_core::domain::QueryStatus, WarehouseError> {
            Ok(warehouse_core::domain::QueryStatus::Running {
                query_id: QueryId::new(query_id).unwrap(),
            })
        }
        async fn cancel(&self, _query_id: &str) -> Result<(), WarehouseError> {
            Ok(())
        }
        async fn renew_chunk_urls(&self, query_id: &str) -> Result<ResultDescriptor, WarehouseError> {
            Ok(descriptor(query_id))
        }
    }

    #[tokio::test]
    async fn execute_polls_until_terminal() {
        let session = Arc::new(FakeSession {
            poll_calls: AtomicUsize::new(0),
            terminal_after: 2,
        });
        let executor = QueryExecutor::new(session, QueryContextCache::new(None));
        let outcome = executor
            .execute("select 1", None, Some(Duration::from_secs(5)), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.descriptors.len(), 1);
    }

    #[tokio::test]
    async fn execute_respects_cancellation() {
        let session = Arc::new(FakeSession {
            poll_calls: AtomicUsize::new(0),
            terminal_after: 1000,
        });
        let executor = QueryExecutor::new(session, QueryContextCache::new(None));
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token_clone.cancel();
        });
        let result = executor
            .execute("select 1", None, Some(Duration::from_secs(30)), token)
            .await;
        assert!(result.is_err());
    }
}

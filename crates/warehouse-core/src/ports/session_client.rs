//! `ICloudSession` port: login/renew/close/submit/poll/cancel against the
//! warehouse's session protocol (spec §4.1). Implemented by
//! `warehouse-session`; consumed by query-executor use cases that want to
//! stay decoupled from the HTTP shape.

use async_trait::async_trait;

use crate::config::Config;
use crate::domain::{
    QueryContextCache, QueryStatus, ResultDescriptor, TokenTriple, WarehouseError,
};

/// Parameters negotiated at login and mutated over the session's lifetime
/// (spec §3.1 `Session` "current database/schema/warehouse/role" and
/// "server-negotiated parameters").
#[derive(Debug, Clone, Default)]
pub struct SessionParameters {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub raw: std::collections::BTreeMap<String, String>,
}

/// Everything a successful login/renew hands back (spec §4.3 "The
/// authenticator returns (token, masterToken, sessionID,
/// serverParameters, sessionInfo)").
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenTriple,
    pub session_id: String,
    pub parameters: SessionParameters,
    pub master_validity_seconds: u64,
}

#[async_trait]
pub trait ICloudSession: Send + Sync {
    async fn login(&self, config: &Config) -> Result<LoginOutcome, WarehouseError>;

    /// Mints a fresh session token from the master token (spec §4.1
    /// `POST /session/token-request`).
    async fn renew(&self, master_token: &str) -> Result<TokenTriple, WarehouseError>;

    async fn close(&self) -> Result<(), WarehouseError>;

    /// Submits SQL text and returns either a terminal descriptor or an
    /// async/queued status the caller should poll (spec §4.1).
    async fn submit(
        &self,
        sql: &str,
        context_cache: &QueryContextCache,
        multi_statement_count: Option<u32>,
    ) -> Result<SubmitOutcome, WarehouseError>;

    /// Polls `GET /queries/<qid>/result` for a previously submitted
    /// statement, reusing the original request id (Invariant 3.2.3).
    async fn poll(&self, query_id: &str) -> Result<SubmitOutcome, WarehouseError>;

    /// `GET /monitoring/queries/<qid>` (spec §4.1 status polling).
    async fn query_status(&self, query_id: &str) -> Result<QueryStatus, WarehouseError>;

    /// `POST /queries/v1/abort-request` (spec §4.1 cancellation).
    async fn cancel(&self, query_id: &str) -> Result<(), WarehouseError>;

    /// Re-requests chunk presigned URLs for a query whose chunk GETs
    /// returned 401/403 (spec §4.2 "Failure & renewal").
    async fn renew_chunk_urls(&self, query_id: &str) -> Result<ResultDescriptor, WarehouseError>;
}

/// What `submit`/`poll` resolve to (spec §4.1 "three shapes").
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Completed(ResultDescriptor),
    StillRunning { query_id: String },
    Failed(WarehouseError),
}

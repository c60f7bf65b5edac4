//! Cross-cutting error taxonomy.
//!
//! [`WarehouseError`] is the single error type returned across crate
//! boundaries (spec §6.3/§7). Crate-local error enums (e.g. in
//! `warehouse-auth`, `warehouse-transfer`) convert into it via `#[from]`
//! at their public boundary, the way the teacher's `ConflictError` and
//! `CacheError` funnel into call sites expecting `DomainError`.

use thiserror::Error;

/// Server-reported SQL state plus the numeric code the driver maps it to
/// (spec §6.3 `ErrCode*` family).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerErrorContext {
    pub sql_state: Option<String>,
    pub server_code: Option<String>,
    pub message: String,
    pub query_id: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    /// Malformed connection parameters caught before any I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Authentication failed outright (bad password, rejected SAML
    /// assertion, JWT signature rejected, workload-identity attestation
    /// refused).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The OAuth/PKCE loopback flow was cancelled, timed out, or the
    /// returned CSRF state did not match.
    #[error("authorization flow failed: {0}")]
    AuthorizationFlowFailed(String),

    /// A second authentication attempt was made while one was already in
    /// flight (single-authentication lock, §5).
    #[error("authentication already in progress")]
    AuthenticationInProgress,

    /// Session token expired and renewal also failed.
    #[error("session expired and could not be renewed: {0}")]
    SessionExpired(String),

    /// The session/query endpoint returned a response outside expected
    /// shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure after retries exhausted.
    #[error("request failed after {attempts} attempt(s): {message}")]
    RequestFailed { attempts: u32, message: String },

    /// Response body exceeded `ResponseBodyLimit` (100 MiB, spec §4.5).
    #[error("response body exceeded the {limit_bytes} byte limit")]
    ResponseTooLarge { limit_bytes: u64 },

    /// A query is still running when the caller's poll deadline (or the
    /// implementation default, spec Open Question (i)) is reached.
    #[error("query {query_id} did not complete within the poll deadline")]
    QueryStillRunning { query_id: String },

    /// Server reported a SQL execution error.
    #[error("query {0:?} failed")]
    QueryFailed(ServerErrorContext),

    /// Caller cancelled a running query.
    #[error("query {query_id} was cancelled")]
    QueryCancelled { query_id: String },

    /// A chunk fetch failed after exhausting retry attempts.
    #[error("chunk {index} failed after {attempts} attempt(s): {message}")]
    ChunkFetchFailed {
        index: usize,
        attempts: u32,
        message: String,
    },

    /// A chunk's format tag did not match any known decoder.
    #[error("unrecognised chunk format tag: {0}")]
    UnknownChunkFormat(String),

    /// File-transfer specific failures (spec §4.4 status machine folds
    /// into this for terminal, non-retryable cases).
    #[error("file transfer error for {path}: {message}")]
    FileTransferFailed { path: String, message: String },

    /// The PUT/GET command text did not match the expected grammar.
    #[error("could not parse PUT/GET command: {0}")]
    InvalidTransferCommand(String),

    /// An object-store adapter call failed.
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// Generic state-machine invariant violation, analogous to the
    /// teacher's `InvalidState`.
    #[error("invalid state transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl WarehouseError {
    /// Whether a retrier should treat this as transient (spec §7: retry
    /// budgets are per operation class, not per error, but some terminal
    /// errors must never be retried regardless of budget remaining).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WarehouseError::InvalidConfig(_)
                | WarehouseError::AuthenticationFailed(_)
                | WarehouseError::AuthorizationFlowFailed(_)
                | WarehouseError::AuthenticationInProgress
                | WarehouseError::QueryCancelled { .. }
                | WarehouseError::InvalidTransferCommand(_)
                | WarehouseError::InvalidState { .. }
                | WarehouseError::ValidationFailed(_)
                | WarehouseError::UnknownChunkFormat(_)
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, WarehouseError::QueryStillRunning { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            WarehouseError::QueryFailed(_) | WarehouseError::QueryCancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(!WarehouseError::AuthenticationFailed("bad password".into()).is_retryable());
        assert!(WarehouseError::RequestFailed {
            attempts: 3,
            message: "timeout".into()
        }
        .is_retryable());
        assert!(WarehouseError::ResponseTooLarge {
            limit_bytes: 100 * 1024 * 1024
        }
        .is_retryable());
    }

    #[test]
    fn query_still_running_is_running_not_error() {
        let err = WarehouseError::QueryStillRunning {
            query_id: "abc".into(),
        };
        assert!(err.is_running());
        assert!(!err.is_error());
    }

    #[test]
    fn query_failed_is_error_not_running() {
        let err = WarehouseError::QueryFailed(ServerErrorContext {
            sql_state: Some("42000".into()),
            server_code: Some("000002".into()),
            message: "syntax error".into(),
            query_id: Some("abc".into()),
        });
        assert!(err.is_error());
        assert!(!err.is_running());
    }

    #[test]
    fn display_formats_are_stable() {
        let err = WarehouseError::SessionExpired("renewal rejected".into());
        assert_eq!(
            err.to_string(),
            "session expired and could not be renewed: renewal rejected"
        );
    }
}

//! Session and query-status domain entities (spec §3.1, §3.2, §4.1).
//!
//! Pure state: no I/O, no locking. `warehouse-session` owns the
//! `RwLock`/refresh-mutex wrapping around [`TokenTriple`] and drives state
//! transitions through [`QueryStatus`]; this module only defines the shapes
//! and the transition/validity rules (Invariants 3.2.1-3.2.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::WarehouseError;
use super::newtypes::{QueryId, SecretToken};

/// The three credentials a session juggles: the session token used for
/// ordinary requests, the master token used only to renew the session
/// token, and the id token some authenticators also return (spec §4.1,
/// §5 "TokenAccessor").
#[derive(Clone)]
pub struct TokenTriple {
    pub session_token: SecretToken,
    pub master_token: SecretToken,
    pub id_token: Option<SecretToken>,
    pub issued_at: DateTime<Utc>,
    pub session_token_ttl: chrono::Duration,
}

impl TokenTriple {
    pub fn new(
        session_token: SecretToken,
        master_token: SecretToken,
        id_token: Option<SecretToken>,
        session_token_ttl: chrono::Duration,
    ) -> Self {
        Self {
            session_token,
            master_token,
            id_token,
            issued_at: Utc::now(),
            session_token_ttl,
        }
    }

    /// Whether the session token is past its advertised lifetime as of
    /// `now`. Callers renew proactively on this, and reactively on a
    /// server-reported expiry code (spec §4.1 renew flow).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.issued_at + self.session_token_ttl
    }
}

impl std::fmt::Debug for TokenTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenTriple")
            .field("session_token", &self.session_token)
            .field("master_token", &self.master_token)
            .field("id_token", &self.id_token)
            .field("issued_at", &self.issued_at)
            .field("session_token_ttl", &self.session_token_ttl)
            .finish()
    }
}

/// Lifecycle state of a logical connection (Invariant 3.2.1: a session is
/// `Active` only between a successful login and an explicit/implicit
/// close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed but `login` has not yet completed.
    Unauthenticated,
    /// Logged in; session token usable for submit/poll/cancel.
    Active,
    /// `close` was called or the server reported the session gone;
    /// terminal, no further requests are valid (Invariant 3.2.2).
    Closed,
}

impl SessionState {
    pub fn can_submit(self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Valid transitions: Unauthenticated -> Active -> Closed. No
    /// transition may skip Active nor leave Closed (Invariant 3.2.2).
    pub fn validate_transition(self, next: SessionState) -> Result<(), WarehouseError> {
        let ok = matches!(
            (self, next),
            (SessionState::Unauthenticated, SessionState::Active)
                | (SessionState::Active, SessionState::Closed)
                | (SessionState::Unauthenticated, SessionState::Closed)
        );
        if ok {
            Ok(())
        } else {
            Err(WarehouseError::InvalidState {
                from: format!("{self:?}"),
                to: format!("{next:?}"),
            })
        }
    }
}

/// Outcome of a submit/poll cycle (spec §4.1 QueryExecutor).
///
/// `is_running`/`is_error` mirror the teacher's `SessionStatus` accessor
/// pair so call sites read the same way: `if status.is_running() { ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueryStatus {
    /// Server accepted the statement but execution has not finished.
    Running { query_id: QueryId },
    /// Server queued the statement behind warehouse provisioning/resume.
    Queued { query_id: QueryId },
    /// Execution finished successfully; a [`ResultDescriptor`](super::query::ResultDescriptor)
    /// is available from the same response.
    Succeeded { query_id: QueryId },
    /// Execution finished with a SQL/server error.
    Failed {
        query_id: QueryId,
        sql_state: Option<String>,
        server_code: Option<String>,
        message: String,
    },
    /// Caller (or the session on close) cancelled the statement.
    Cancelled { query_id: QueryId },
}

impl QueryStatus {
    pub fn query_id(&self) -> &QueryId {
        match self {
            QueryStatus::Running { query_id }
            | QueryStatus::Queued { query_id }
            | QueryStatus::Succeeded { query_id }
            | QueryStatus::Failed { query_id, .. }
            | QueryStatus::Cancelled { query_id } => query_id,
        }
    }

    /// True while the poll loop should keep polling (spec §4.1).
    pub fn is_running(&self) -> bool {
        matches!(self, QueryStatus::Running { .. } | QueryStatus::Queued { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryStatus::Failed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    /// Converts a terminal error status into a [`WarehouseError`], or
    /// `None` if the status is not an error (Invariant 3.2.3: a
    /// `Failed` status always carries a server message).
    pub fn into_error(self) -> Option<WarehouseError> {
        match self {
            QueryStatus::Failed {
                query_id,
                sql_state,
                server_code,
                message,
            } => Some(WarehouseError::QueryFailed(
                super::errors::ServerErrorContext {
                    sql_state,
                    server_code,
                    message,
                    query_id: Some(query_id.as_str().to_string()),
                },
            )),
            QueryStatus::Cancelled { query_id } => Some(WarehouseError::QueryCancelled {
                query_id: query_id.as_str().to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> SecretToken {
        SecretToken::new(s.to_string()).unwrap()
    }

    #[test]
    fn token_triple_expiry() {
        let triple = TokenTriple::new(
            token("session"),
            token("master"),
            None,
            chrono::Duration::seconds(60),
        );
        assert!(!triple.is_expired_at(Utc::now()));
        assert!(triple.is_expired_at(Utc::now() + chrono::Duration::seconds(120)));
    }

    #[test]
    fn token_triple_debug_redacts_secrets() {
        let triple = TokenTriple::new(
            token("super-secret-session"),
            token("super-secret-master"),
            None,
            chrono::Duration::seconds(60),
        );
        let debugged = format!("{triple:?}");
        assert!(!debugged.contains("super-secret-session"));
        assert!(!debugged.contains("super-secret-master"));
    }

    #[test]
    fn session_state_valid_transitions() {
        assert!(SessionState::Unauthenticated
            .validate_transition(SessionState::Active)
            .is_ok());
        assert!(SessionState::Active
            .validate_transition(SessionState::Closed)
            .is_ok());
    }

    #[test]
    fn session_state_rejects_reopen_after_close() {
        assert!(SessionState::Closed
            .validate_transition(SessionState::Active)
            .is_err());
    }

    #[test]
    fn query_status_running_vs_error() {
        let qid = QueryId::new("01").unwrap();
        let running = QueryStatus::Running {
            query_id: qid.clone(),
        };
        assert!(running.is_running());
        assert!(!running.is_error());

        let failed = QueryStatus::Failed {
            query_id: qid,
            sql_state: Some("42000".into()),
            server_code: Some("000002".into()),
            message: "syntax error".into(),
        };
        assert!(!failed.is_running());
        assert!(failed.is_error());
        assert!(failed.into_error().is_some());
    }
}

//! `SessionClient`: the `ICloudSession` adapter built on
//! `warehouse-transport` + `warehouse-auth` (spec §4.1 Component B+D).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warehouse_core::config::Config;
use warehouse_core::domain::{
    ChunkRef, ColumnMeta, ColumnType, QueryContextCache, QueryContextEntry, QueryId, QueryStatus,
    ResultDescriptor, ResultFormat, WarehouseError,
};
use warehouse_core::ports::{ICloudSession, IAuthenticator, LoginOutcome, SubmitOutcome};
use warehouse_transport::{OperationClass, Transport, TransportRequest};

use crate::token_accessor::TokenAccessor;

pub struct SessionClient {
    transport: Arc<Transport>,
    authenticator: Arc<dyn IAuthenticator>,
    config: Config,
    tokens: std::sync::OnceLock<Arc<TokenAccessor>>,
    /// The request id each in-flight query was submitted with, keyed by
    /// server-assigned query id, so `poll()` can send the server the SAME
    /// `requestId`/`X-Request-Guid` that `submit()` used (Invariant 3,
    /// spec §3.2) even though `poll` only takes a `query_id`.
    request_ids: DashMap<String, Uuid>,
}

impl SessionClient {
    pub fn new(
        transport: Arc<Transport>,
        authenticator: Arc<dyn IAuthenticator>,
        config: Config,
    ) -> Self {
        Self {
            transport,
            authenticator,
            config,
            tokens: std::sync::OnceLock::new(),
            request_ids: DashMap::new(),
        }
    }

    /// Appends `requestId`/`request_guid` query params carrying `request_id`
    /// to `url`, which may already carry its own query string.
    fn with_request_id(url: &str, request_id: Uuid) -> String {
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{url}{sep}requestId={request_id}&request_guid={request_id}")
    }

    fn tokens(&self) -> Result<&Arc<TokenAccessor>, WarehouseError> {
        self.tokens
            .get()
            .ok_or_else(|| WarehouseError::Protocol("session has not logged in".to_string()))
    }

    async fn session_token(&self) -> Result<String, WarehouseError> {
        Ok(self.tokens()?.session_token().await)
    }

    /// Retries the 390104/390111 re-auth codes exactly once by re-running
    /// the authenticator's `refresh`, per spec §4.3.
    async fn reauth_once(&self) -> Result<(), WarehouseError> {
        let outcome: LoginOutcome = self.authenticator.refresh(&self.config).await?.into();
        self.tokens()?.set(outcome.tokens).await;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultEnvelopeData {
    query_id: String,
    #[serde(default)]
    sql_state: Option<String>,
    #[serde(default)]
    row_type: Vec<WireColumn>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    chunks: Vec<WireChunk>,
    #[serde(default)]
    chunk_headers: Vec<(String, String)>,
    #[serde(default)]
    qrmk: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    statement_handles: Vec<String>,
    #[serde(default)]
    query_result_format: Option<String>,
    #[serde(default)]
    query_context: Vec<WireContextEntry>,
    /// Present while the query is still executing; the caller should poll
    /// again rather than treat an empty rowset as a completed, columnless
    /// result (spec §4.1, code `333334`).
    #[serde(default)]
    get_result_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireColumn {
    name: String,
    #[serde(rename = "type")]
    type_: String,
    precision: Option<u32>,
    scale: Option<u32>,
    nullable: bool,
    #[serde(default)]
    byte_length: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChunk {
    url: String,
    uncompressed_size: u64,
    row_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContextEntry {
    id: u64,
    timestamp: i64,
    priority: u64,
    context: String,
}

fn parse_column_type(raw: &str) -> ColumnType {
    match raw.to_ascii_uppercase().as_str() {
        "BOOLEAN" => ColumnType::Boolean,
        "TEXT" | "VARCHAR" | "STRING" => ColumnType::Text,
        "REAL" | "FLOAT" | "DOUBLE" => ColumnType::Real,
        "FIXED" | "NUMBER" | "INTEGER" => ColumnType::Fixed,
        "DATE" => ColumnType::Date,
        "TIME" => ColumnType::Time,
        "TIMESTAMP_LTZ" => ColumnType::TimestampLtz,
        "TIMESTAMP_NTZ" => ColumnType::TimestampNtz,
        "TIMESTAMP_TZ" => ColumnType::TimestampTz,
        "BINARY" => ColumnType::Binary,
        "ARRAY" => ColumnType::Array,
        "OBJECT" => ColumnType::Object,
        _ => ColumnType::Variant,
    }
}

fn build_descriptor(data: ResultEnvelopeData) -> Result<ResultDescriptor, WarehouseError> {
    let query_id = QueryId::new(data.query_id)?;
    let columns = data
        .row_type
        .into_iter()
        .map(|c| ColumnMeta {
            name: c.name,
            column_type: parse_column_type(&c.type_),
            precision: c.precision,
            scale: c.scale,
            nullable: c.nullable,
            byte_length: c.byte_length,
        })
        .collect();
    let chunks = data
        .chunks
        .into_iter()
        .map(|c| ChunkRef {
            url: c.url,
            uncompressed_byte_length: c.uncompressed_size,
            row_count: c.row_count,
            headers: data.chunk_headers.clone(),
        })
        .collect();
    let statement_handles = data
        .statement_handles
        .into_iter()
        .map(QueryId::new)
        .collect::<Result<Vec<_>, _>>()?;
    let format = match data.query_result_format.as_deref() {
        Some("arrow") | Some("columnar_binary") => ResultFormat::ColumnarBinary,
        _ => ResultFormat::JsonRowSet,
    };

    Ok(ResultDescriptor {
        query_id,
        columns,
        total_row_count: data.total.unwrap_or(data.rowset.len() as u64),
        inline_rows: data.rowset,
        chunks,
        format,
        qrmk: data.qrmk,
        sql_state: data.sql_state,
        statement_handles,
    })
}

fn context_entries_from_wire(entries: Vec<WireContextEntry>) -> Vec<QueryContextEntry> {
    entries
        .into_iter()
        .map(|e| QueryContextEntry {
            id: e.id,
            timestamp: e.timestamp,
            priority: e.priority,
            payload: e.context,
        })
        .collect()
}

#[async_trait]
impl ICloudSession for SessionClient {
    async fn login(&self, config: &Config) -> Result<LoginOutcome, WarehouseError> {
        info!(account = %config.account, "logging in");
        let material = self.authenticator.obtain_token(config).await?;
        let outcome: LoginOutcome = material.into();
        let accessor = TokenAccessor::new(outcome.tokens.clone());
        self.tokens
            .set(accessor)
            .map_err(|_| WarehouseError::Protocol("session already logged in".to_string()))?;
        Ok(outcome)
    }

    async fn renew(&self, master_token: &str) -> Result<warehouse_core::domain::TokenTriple, WarehouseError> {
        let url = format!("{}/session/token-request", self.config.base_url());
        let body = serde_json::json!({ "oldSessionToken": master_token, "requestType": "RENEW" });
        let payload = serde_json::to_vec(&body)
            .map_err(|e| WarehouseError::Protocol(format!("failed to serialize renew body: {e}")))?;

        #[derive(Deserialize)]
        struct RenewData {
            #[serde(rename = "sessionToken")]
            session_token: String,
            #[serde(rename = "validityInSecondsST")]
            validity_in_seconds: Option<u64>,
        }

        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::POST,
                url: &url,
                body: Some(payload),
                request_id: Uuid::new_v4(),
                session_token: None,
                service_name: None,
                operation_class: OperationClass::Login,
                idempotent: false,
            })
            .await?;

        let envelope: Envelope<RenewData> = serde_json::from_slice(&response)
            .map_err(|e| WarehouseError::Protocol(format!("malformed renew response: {e}")))?;
        if !envelope.success {
            return Err(WarehouseError::SessionExpired(
                envelope.message.unwrap_or_else(|| "renewal rejected".to_string()),
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| WarehouseError::Protocol("renew response missing data".to_string()))?;

        let master = self.tokens()?.master_token().await;
        Ok(warehouse_core::domain::TokenTriple::new(
            warehouse_core::domain::newtypes::SecretToken::new(data.session_token)?,
            warehouse_core::domain::newtypes::SecretToken::new(master)?,
            None,
            chrono::Duration::seconds(data.validity_in_seconds.unwrap_or(3600) as i64),
        ))
    }

    async fn close(&self) -> Result<(), WarehouseError> {
        let session_token = self.session_token().await?;
        let url = format!("{}/session?delete=true", self.config.base_url());
        debug!("closing session");
        let _ = self
            .transport
            .execute(TransportRequest {
                method: Method::POST,
                url: &url,
                body: None,
                request_id: Uuid::new_v4(),
                session_token: Some(session_token),
                service_name: None,
                operation_class: OperationClass::Login,
                idempotent: false,
            })
            .await?;
        Ok(())
    }

    async fn submit(
        &self,
        sql: &str,
        context_cache: &QueryContextCache,
        multi_statement_count: Option<u32>,
    ) -> Result<SubmitOutcome, WarehouseError> {
        let session_token = self.session_token().await?;
        let request_id = Uuid::new_v4();
        let url = Self::with_request_id(
            &format!("{}/queries/v1/query-request", self.config.base_url()),
            request_id,
        );
        let body = serde_json::json!({
            "sqlText": sql,
            "queryContextDTO": { "entries": context_cache.snapshot() },
            "parameters": { "MULTI_STATEMENT_COUNT": multi_statement_count },
        });
        let payload = serde_json::to_vec(&body)
            .map_err(|e| WarehouseError::Protocol(format!("failed to serialize submit body: {e}")))?;

        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::POST,
                url: &url,
                body: Some(payload),
                request_id,
                session_token: Some(session_token),
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: false,
            })
            .await?;

        let outcome = self.interpret_result_response(&response).await?;
        self.remember_request_id(&outcome, request_id);
        Ok(outcome)
    }

    async fn poll(&self, query_id: &str) -> Result<SubmitOutcome, WarehouseError> {
        let session_token = self.session_token().await?;
        let request_id = self
            .request_ids
            .get(query_id)
            .map(|e| *e.value())
            .unwrap_or_else(|| {
                warn!(query_id, "polling a query with no remembered request id, minting a new one");
                Uuid::new_v4()
            });
        let url = Self::with_request_id(
            &format!("{}/queries/{query_id}/result", self.config.base_url()),
            request_id,
        );
        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &url,
                body: None,
                request_id,
                session_token: Some(session_token),
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: true,
            })
            .await?;

        let outcome = self.interpret_result_response(&response).await?;
        self.remember_request_id(&outcome, request_id);
        Ok(outcome)
    }

    async fn query_status(&self, query_id: &str) -> Result<QueryStatus, WarehouseError> {
        let session_token = self.session_token().await?;
        let url = format!("{}/monitoring/queries/{query_id}", self.config.base_url());

        #[derive(Deserialize)]
        struct StatusData {
            status: String,
            #[serde(default)]
            sql_state: Option<String>,
            #[serde(default)]
            error_code: Option<String>,
            #[serde(default)]
            error_message: Option<String>,
        }

        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &url,
                body: None,
                request_id: Uuid::new_v4(),
                session_token: Some(session_token),
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: true,
            })
            .await?;

        let envelope: Envelope<StatusData> = serde_json::from_slice(&response)
            .map_err(|e| WarehouseError::Protocol(format!("malformed status response: {e}")))?;
        let data = envelope
            .data
            .ok_or_else(|| WarehouseError::Protocol("status response missing data".to_string()))?;
        let qid = QueryId::new(query_id)?;

        Ok(match data.status.to_ascii_uppercase().as_str() {
            "RUNNING" => QueryStatus::Running { query_id: qid },
            "QUEUED" | "RESUMING_WAREHOUSE" => QueryStatus::Queued { query_id: qid },
            "SUCCESS" => QueryStatus::Succeeded { query_id: qid },
            "ABORTED" | "CANCELLED" => QueryStatus::Cancelled { query_id: qid },
            _ => QueryStatus::Failed {
                query_id: qid,
                sql_state: data.sql_state,
                server_code: data.error_code,
                message: data.error_message.unwrap_or_else(|| "query failed".to_string()),
            },
        })
    }

    async fn cancel(&self, query_id: &str) -> Result<(), WarehouseError> {
        let session_token = self.session_token().await?;
        let url = format!("{}/queries/v1/abort-request", self.config.base_url());
        let body = serde_json::json!({ "queryId": query_id });
        let payload = serde_json::to_vec(&body)
            .map_err(|e| WarehouseError::Protocol(format!("failed to serialize cancel body: {e}")))?;

        let _ = self
            .transport
            .execute(TransportRequest {
                method: Method::POST,
                url: &url,
                body: Some(payload),
                request_id: Uuid::new_v4(),
                session_token: Some(session_token),
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: false,
            })
            .await?;
        Ok(())
    }

    async fn renew_chunk_urls(&self, query_id: &str) -> Result<ResultDescriptor, WarehouseError> {
        let session_token = self.session_token().await?;
        let url = format!("{}/queries/{query_id}/result?renew_chunks=true", self.config.base_url());
        let response = self
            .transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &url,
                body: None,
                request_id: Uuid::new_v4(),
                session_token: Some(session_token),
                service_name: None,
                operation_class: OperationClass::Chunk,
                idempotent: true,
            })
            .await?;

        let envelope: Envelope<ResultEnvelopeData> = serde_json::from_slice(&response)
            .map_err(|e| WarehouseError::Protocol(format!("malformed chunk-renewal response: {e}")))?;
        if !envelope.success {
            return Err(WarehouseError::Protocol(
                envelope.message.unwrap_or_else(|| "chunk url renewal rejected".to_string()),
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| WarehouseError::Protocol("chunk-renewal response missing data".to_string()))?;
        build_descriptor(data)
    }
}

/// Server code meaning "query still running, poll again" (spec §4.1).
const QUERY_IN_PROGRESS_CODE: &str = "333334";

impl SessionClient {
    /// Keeps `query_id -> request_id` around while a query is still
    /// running so the next `poll()` reuses it, and forgets it once the
    /// query reaches a terminal state.
    fn remember_request_id(&self, outcome: &SubmitOutcome, request_id: Uuid) {
        match outcome {
            SubmitOutcome::StillRunning { query_id } => {
                self.request_ids.insert(query_id.clone(), request_id);
            }
            SubmitOutcome::Completed(descriptor) => {
                self.request_ids.remove(descriptor.query_id.as_str());
            }
            SubmitOutcome::Failed(_) => {}
        }
    }

    async fn interpret_result_response(&self, response: &[u8]) -> Result<SubmitOutcome, WarehouseError> {
        let envelope: Envelope<ResultEnvelopeData> = serde_json::from_slice(response)
            .map_err(|e| WarehouseError::Protocol(format!("malformed result response: {e}")))?;

        if let Some(code) = &envelope.code {
            if warehouse_auth::authenticator::is_reauth_code(code) {
                warn!(code, "server requested re-authentication, retrying once");
                self.reauth_once().await?;
                return Err(WarehouseError::SessionExpired(
                    "re-authenticated; caller should retry the request".to_string(),
                ));
            }
        }

        let still_running = envelope.code.as_deref() == Some(QUERY_IN_PROGRESS_CODE)
            || envelope
                .data
                .as_ref()
                .is_some_and(|d| d.get_result_url.is_some());
        if still_running {
            let query_id = envelope
                .data
                .as_ref()
                .map(|d| d.query_id.clone())
                .ok_or_else(|| {
                    WarehouseError::Protocol("still-running response missing query id".to_string())
                })?;
            return Ok(SubmitOutcome::StillRunning { query_id });
        }

        if !envelope.success {
            let query_id = envelope
                .data
                .as_ref()
                .map(|d| d.query_id.clone())
                .unwrap_or_default();
            return Ok(SubmitOutcome::Failed(WarehouseError::QueryFailed(
                warehouse_core::domain::ServerErrorContext {
                    sql_state: None,
                    server_code: envelope.code,
                    message: envelope.message.unwrap_or_else(|| "query failed".to_string()),
                    query_id: Some(query_id),
                },
            )));
        }

        let mut data = envelope
            .data
            .ok_or_else(|| WarehouseError::Protocol("result response missing data".to_string()))?;

        let context_entries = context_entries_from_wire(std::mem::take(&mut data.query_context));
        if !context_entries.is_empty() {
            debug!(
                count = context_entries.len(),
                "received query context entries; caller merges them into its QueryContextCache"
            );
        }
        let descriptor = build_descriptor(data)?;
        Ok(SubmitOutcome::Completed(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::config::ConfigBuilder;
    use warehouse_core::ports::TokenMaterial;
    use warehouse_transport::TransportConfig;

    struct UnusedAuthenticator;

    #[async_trait]
    impl IAuthenticator for UnusedAuthenticator {
        async fn obtain_token(&self, _config: &Config) -> Result<TokenMaterial, WarehouseError> {
            unreachable!("not exercised by these tests")
        }
    }

    fn client() -> SessionClient {
        let transport = Arc::new(Transport::new(TransportConfig::default()).unwrap());
        let config = ConfigBuilder::new("acct", "user").build();
        SessionClient::new(transport, Arc::new(UnusedAuthenticator), config)
    }

    #[tokio::test]
    async fn zero_row_result_is_completed_not_still_running() {
        let client = client();
        let body = serde_json::json!({
            "success": true,
            "data": {
                "queryId": "q1",
                "rowType": [],
                "rowset": [],
                "chunks": [],
                "total": 0,
            }
        });
        let outcome = client
            .interpret_result_response(&serde_json::to_vec(&body).unwrap())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn get_result_url_present_means_still_running() {
        let client = client();
        let body = serde_json::json!({
            "success": true,
            "data": {
                "queryId": "q1",
                "getResultUrl": "/queries/q1/result",
            }
        });
        let outcome = client
            .interpret_result_response(&serde_json::to_vec(&body).unwrap())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::StillRunning { query_id } if query_id == "q1"));
    }

    #[tokio::test]
    async fn code_333334_means_still_running() {
        let client = client();
        let body = serde_json::json!({
            "success": true,
            "code": "333334",
            "data": { "queryId": "q1" }
        });
        let outcome = client
            .interpret_result_response(&serde_json::to_vec(&body).unwrap())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::StillRunning { query_id } if query_id == "q1"));
    }

    #[test]
    fn parses_known_column_types() {
        assert_eq!(parse_column_type("FIXED"), ColumnType::Fixed);
        assert_eq!(parse_column_type("text"), ColumnType::Text);
        assert_eq!(parse_column_type("whatever"), ColumnType::Variant);
    }

    #[test]
    fn build_descriptor_maps_statement_handles() {
        let data = ResultEnvelopeData {
            query_id: "q1".to_string(),
            sql_state: None,
            row_type: vec![],
            rowset: vec![],
            chunks: vec![],
            chunk_headers: vec![],
            qrmk: None,
            total: Some(0),
            statement_handles: vec!["q1".to_string(), "q2".to_string()],
            query_result_format: None,
            query_context: vec![],
            get_result_url: None,
        };
        let descriptor = build_descriptor(data).unwrap();
        assert_eq!(descriptor.statement_handles.len(), 2);
        assert!(descriptor.has_more_statements(0));
    }
}

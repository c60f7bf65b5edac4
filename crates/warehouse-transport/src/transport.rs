//! `Transport`: the `reqwest`-backed HTTP wrapper every other crate builds
//! requests through (spec §4.5).

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;
use warehouse_core::domain::WarehouseError;

use crate::backoff::{parse_retry_after, BackoffPolicy, OperationClass};
use crate::headers::StandardHeaders;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub response_body_limit_bytes: u64,
    pub backoff: BackoffPolicy,
    pub include_retry_reason: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            response_body_limit_bytes: 100 * 1024 * 1024,
            backoff: BackoffPolicy::default(),
            include_retry_reason: false,
        }
    }
}

/// One outbound call. `idempotent` controls whether the transport will
/// retry on connection-level failures with no server response at all
/// (spec §4.5 "Idempotent GETs and safe POSTs").
///
/// `request_id` must be the caller's stable per-statement id (the same
/// one baked into `url`'s `requestId`/`request_guid` query params), so
/// that retrying this same logical request sends the `X-Request-Guid`
/// header the server already saw on the first attempt (Invariant 3,
/// spec §3.2).
pub struct TransportRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub body: Option<Vec<u8>>,
    pub request_id: Uuid,
    pub session_token: Option<String>,
    pub service_name: Option<String>,
    pub operation_class: OperationClass,
    pub idempotent: bool,
}

pub struct Transport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| WarehouseError::InvalidConfig(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Executes one logical request, retrying transient failures within
    /// the operation class's budget and backing off with full jitter
    /// (spec §4.5). The caller is responsible for keeping `url`/`body`/
    /// `request_id` identical across retries so the server-visible request
    /// id does not change (Invariant 3.2.3); this method only controls
    /// timing and reuses `request.request_id` on the `X-Request-Guid`
    /// header for every attempt.
    pub async fn execute(&self, request: TransportRequest<'_>) -> Result<Vec<u8>, WarehouseError> {
        let max_attempts = request.operation_class.max_attempts();
        let budget = request.operation_class.budget();
        let started = Instant::now();
        let mut last_retry_reason: Option<String> = None;

        for attempt in 0..max_attempts {
            if let Some(budget) = budget {
                if started.elapsed() >= budget {
                    break;
                }
            }

            let mut builder = self.client.request(request.method.clone(), request.url);
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            let headers = StandardHeaders {
                request_id: request.request_id,
                session_token: request.session_token.clone(),
                service_name: request.service_name.clone(),
                retry_reason: if self.config.include_retry_reason {
                    last_retry_reason.clone()
                } else {
                    None
                },
            };
            builder = headers.apply(builder);

            debug!(url = request.url, attempt, "sending request");
            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt + 1 >= max_attempts || (!request.idempotent && !err.is_timeout()) {
                        return Err(WarehouseError::RequestFailed {
                            attempts: attempt + 1,
                            message: err.to_string(),
                        });
                    }
                    warn!(url = request.url, error = %err, "request failed, retrying");
                    last_retry_reason = Some("connection_error".to_string());
                    tokio::time::sleep(self.config.backoff.delay_for(attempt)).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_retry_after(v, self.config.backoff.ceiling))
                    .unwrap_or(self.config.backoff.ceiling);
                if attempt + 1 >= max_attempts {
                    return Err(WarehouseError::RequestFailed {
                        attempts: attempt + 1,
                        message: "rate limited (429) and retry budget exhausted".to_string(),
                    });
                }
                warn!(url = request.url, ?retry_after, "rate limited, backing off");
                last_retry_reason = Some(status.as_u16().to_string());
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if status.is_server_error() {
                if attempt + 1 >= max_attempts {
                    return Err(WarehouseError::RequestFailed {
                        attempts: attempt + 1,
                        message: format!("server error {status} and retry budget exhausted"),
                    });
                }
                warn!(url = request.url, %status, "server error, retrying");
                last_retry_reason = Some(status.as_u16().to_string());
                tokio::time::sleep(self.config.backoff.delay_for(attempt)).await;
                continue;
            }

            return self.read_body_capped(response).await;
        }

        Err(WarehouseError::RequestFailed {
            attempts: max_attempts,
            message: "retry budget exhausted".to_string(),
        })
    }

    async fn read_body_capped(&self, response: reqwest::Response) -> Result<Vec<u8>, WarehouseError> {
        if let Some(len) = response.content_length() {
            if len > self.config.response_body_limit_bytes {
                return Err(WarehouseError::ResponseTooLarge {
                    limit_bytes: self.config.response_body_limit_bytes,
                });
            }
        }

        let limit = self.config.response_body_limit_bytes as usize;
        let mut buf = Vec::new();
        let mut stream = response.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WarehouseError::Protocol(e.to_string()))?;
            if buf.len() + chunk.len() > limit {
                return Err(WarehouseError::ResponseTooLarge {
                    limit_bytes: self.config.response_body_limit_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_request_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::default()).unwrap();
        let body = transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &format!("{}/ok", server.uri()),
                body: None,
                request_id: Uuid::new_v4(),
                session_token: None,
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: true,
            })
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::default()).unwrap();
        let body = transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &format!("{}/flaky", server.uri()),
                body: None,
                request_id: Uuid::new_v4(),
                session_token: None,
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: true,
            })
            .await
            .unwrap();
        assert_eq!(body, b"recovered");
    }

    #[tokio::test]
    async fn retry_reuses_the_same_request_guid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let request_id = Uuid::new_v4();
        let transport = Transport::new(TransportConfig::default()).unwrap();
        transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &format!("{}/flaky", server.uri()),
                body: None,
                request_id,
                session_token: None,
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: true,
            })
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 2);
        for req in &received {
            let guid = req.headers.get("X-Request-Guid").unwrap().to_str().unwrap();
            assert_eq!(guid, request_id.to_string());
        }
    }

    #[tokio::test]
    async fn oversize_response_is_rejected() {
        let server = MockServer::start().await;
        let big_body = vec![b'x'; 2048];
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(big_body))
            .mount(&server)
            .await;

        let mut config = TransportConfig::default();
        config.response_body_limit_bytes = 1024;
        let transport = Transport::new(config).unwrap();
        let err = transport
            .execute(TransportRequest {
                method: Method::GET,
                url: &format!("{}/big", server.uri()),
                body: None,
                request_id: Uuid::new_v4(),
                session_token: None,
                service_name: None,
                operation_class: OperationClass::Query,
                idempotent: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::ResponseTooLarge { .. }));
    }
}

//! Presigned-URL chunk GET with the chunk operation class's retry budget
//! applied to 5xx/network failures, and 401/403 short-circuited to a
//! renewal signal the downloader acts on (spec §4.2 "Failure & renewal").

use std::io::Read;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::warn;
use warehouse_core::domain::{ChunkRef, WarehouseError};
use warehouse_core::ports::IChunkSource;
use warehouse_transport::{BackoffPolicy, OperationClass};

#[derive(Debug)]
pub(crate) enum ChunkFetchOutcome {
    Body(Vec<u8>),
    NeedsRenewal,
}

pub struct ChunkFetcher {
    client: reqwest::Client,
    response_body_limit_bytes: u64,
    backoff: BackoffPolicy,
}

impl ChunkFetcher {
    pub fn new(client: reqwest::Client, response_body_limit_bytes: u64) -> Self {
        Self {
            client,
            response_body_limit_bytes,
            backoff: BackoffPolicy::default(),
        }
    }

    /// One chunk GET, retrying 5xx/network failures up to
    /// `OperationClass::Chunk`'s attempt budget. 401/403 returns
    /// immediately as `NeedsRenewal` without consuming the budget; the
    /// caller renews and resubmits the same logical attempt.
    pub(crate) async fn attempt(&self, chunk: &ChunkRef) -> Result<ChunkFetchOutcome, WarehouseError> {
        let max_attempts = OperationClass::Chunk.max_attempts();

        for attempt in 0..max_attempts {
            let mut builder = self.client.get(&chunk.url);
            for (name, value) in &chunk.headers {
                builder = builder.header(name, value);
            }

            let response = match builder.send().await {
                Ok(r) => r,
                Err(err) => {
                    if attempt + 1 >= max_attempts {
                        return Err(chunk_failed(attempt + 1, err.to_string()));
                    }
                    warn!(url = %chunk.url, error = %err, "chunk fetch failed, retrying");
                    tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Ok(ChunkFetchOutcome::NeedsRenewal);
            }
            if status.is_server_error() {
                if attempt + 1 >= max_attempts {
                    return Err(chunk_failed(attempt + 1, format!("server error {status}")));
                }
                warn!(url = %chunk.url, %status, "chunk server error, retrying");
                tokio::time::sleep(self.backoff.delay_for(attempt)).await;
                continue;
            }
            if !status.is_success() {
                return Err(chunk_failed(attempt + 1, format!("unexpected status {status}")));
            }

            let content_encoding = response
                .headers()
                .get(reqwest::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = self.read_body_capped(response).await?;
            return Ok(ChunkFetchOutcome::Body(decompress(body, content_encoding.as_deref())?));
        }

        Err(chunk_failed(max_attempts, "retry budget exhausted".to_string()))
    }

    async fn read_body_capped(&self, response: reqwest::Response) -> Result<Vec<u8>, WarehouseError> {
        use futures_util::StreamExt;

        if let Some(len) = response.content_length() {
            if len > self.response_body_limit_bytes {
                return Err(WarehouseError::ResponseTooLarge {
                    limit_bytes: self.response_body_limit_bytes,
                });
            }
        }

        let limit = self.response_body_limit_bytes as usize;
        let mut buf = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WarehouseError::Protocol(e.to_string()))?;
            if buf.len() + chunk.len() > limit {
                return Err(WarehouseError::ResponseTooLarge {
                    limit_bytes: self.response_body_limit_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

fn chunk_failed(attempts: u32, message: String) -> WarehouseError {
    WarehouseError::ChunkFetchFailed {
        index: 0,
        attempts,
        message,
    }
}

fn decompress(body: Vec<u8>, content_encoding: Option<&str>) -> Result<Vec<u8>, WarehouseError> {
    match content_encoding {
        Some("gzip") => {
            let mut decoder = flate2::read::GzDecoder::new(&body[..]);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| WarehouseError::Protocol(format!("gzip decompression failed: {e}")))?;
            Ok(out)
        }
        Some("deflate") => {
            let mut decoder = flate2::read::DeflateDecoder::new(&body[..]);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| WarehouseError::Protocol(format!("deflate decompression failed: {e}")))?;
            Ok(out)
        }
        _ => Ok(body),
    }
}

/// Plain `IChunkSource` adapter for callers that want retry-on-5xx
/// without the downloader's URL-renewal orchestration (e.g. a cursor
/// fetching a single already-fresh chunk in a test).
#[async_trait]
impl IChunkSource for ChunkFetcher {
    async fn fetch(&self, chunk: &ChunkRef) -> Result<Vec<u8>, WarehouseError> {
        match self.attempt(chunk).await? {
            ChunkFetchOutcome::Body(bytes) => Ok(bytes),
            ChunkFetchOutcome::NeedsRenewal => Err(WarehouseError::ChunkFetchFailed {
                index: 0,
                attempts: 1,
                message: "chunk URL expired (401/403); caller must renew before retrying".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk(url: String) -> ChunkRef {
        ChunkRef {
            url,
            uncompressed_byte_length: 5,
            row_count: 1,
            headers: vec![],
        }
    }

    #[tokio::test]
    async fn successful_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let fetcher = ChunkFetcher::new(reqwest::Client::new(), 1024);
        let outcome = fetcher.attempt(&chunk(server.uri())).await.unwrap();
        match outcome {
            ChunkFetchOutcome::Body(bytes) => assert_eq!(bytes, b"hello"),
            ChunkFetchOutcome::NeedsRenewal => panic!("expected body"),
        }
    }

    #[tokio::test]
    async fn unauthorized_signals_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let fetcher = ChunkFetcher::new(reqwest::Client::new(), 1024);
        let outcome = fetcher.attempt(&chunk(server.uri())).await.unwrap();
        assert!(matches!(outcome, ChunkFetchOutcome::NeedsRenewal));
    }

    #[tokio::test]
    async fn oversize_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 2048]))
            .mount(&server)
            .await;

        let fetcher = ChunkFetcher::new(reqwest::Client::new(), 1024);
        let err = fetcher.attempt(&chunk(server.uri())).await.unwrap_err();
        assert!(matches!(err, WarehouseError::ResponseTooLarge { .. }));
    }
}

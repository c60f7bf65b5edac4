//! `IChunkSource` port: fetches one chunk's bytes given a presigned URL
//! (spec §4.2). Implemented by `warehouse-chunks`' transport-backed
//! fetcher; kept as a trait so the downloader's ordering/backpressure
//! logic is testable against a fake source with no network.

use async_trait::async_trait;

use crate::domain::{ChunkRef, WarehouseError};

#[async_trait]
pub trait IChunkSource: Send + Sync {
    /// Fetches and decompresses one chunk's raw body. Returns
    /// `WarehouseError::ResponseTooLarge` if the body exceeds
    /// `ResponseBodyLimit` before decompression.
    async fn fetch(&self, chunk: &ChunkRef) -> Result<Vec<u8>, WarehouseError>;
}

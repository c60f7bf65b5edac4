//! `IObjectStore` port: provider-specific upload/download primitives with
//! presigned-URL/credential renewal (spec §4.2 Component H). One adapter
//! per provider lives in `warehouse-objectstore`; `warehouse-transfer`
//! depends only on this trait, per the tagged-variant dispatch design note
//! (the adapter crate matches on `StageProvider` internally rather than
//! exposing an open plugin registry).

use async_trait::async_trait;

use crate::domain::{StageInfo, WarehouseError};

#[derive(Debug, Clone)]
pub struct PartUploadRequest<'a> {
    pub key: &'a str,
    pub part_index: u32,
    pub upload_id: &'a str,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_index: u32,
    pub etag: String,
}

#[async_trait]
pub trait IObjectStore: Send + Sync {
    /// Begins a multipart upload, returning a provider-assigned upload id
    /// (spec §4.4 step 5).
    async fn create_multipart_upload(
        &self,
        stage: &StageInfo,
        key: &str,
    ) -> Result<String, WarehouseError>;

    async fn upload_part(
        &self,
        stage: &StageInfo,
        request: PartUploadRequest<'_>,
    ) -> Result<CompletedPart, WarehouseError>;

    async fn complete_multipart_upload(
        &self,
        stage: &StageInfo,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<u64, WarehouseError>;

    /// Direct single-request upload for small files.
    async fn put_object(
        &self,
        stage: &StageInfo,
        key: &str,
        body: Vec<u8>,
    ) -> Result<u64, WarehouseError>;

    /// Byte-range GET used for parallel part downloads (spec §4.4
    /// "Download flow").
    async fn get_object_range(
        &self,
        stage: &StageInfo,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, WarehouseError>;

    async fn head_object(&self, stage: &StageInfo, key: &str) -> Result<ObjectStat, WarehouseError>;

    async fn list_prefix(
        &self,
        stage: &StageInfo,
        prefix: &str,
    ) -> Result<Vec<String>, WarehouseError>;
}

#[derive(Debug, Clone)]
pub struct ObjectStat {
    pub size: u64,
    pub etag: Option<String>,
}

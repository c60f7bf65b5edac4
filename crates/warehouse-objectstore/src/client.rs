//! Tagged-variant `ObjectStoreClient` (Design Note §9, mirroring
//! `warehouse-auth::authenticator::Authenticator`): one enum dispatching
//! over `match` to each provider module rather than an open trait-object
//! registry. `warehouse-transfer` depends only on [`IObjectStore`].

use async_trait::async_trait;
use warehouse_core::domain::{StageInfo, StageProvider, WarehouseError};
use warehouse_core::ports::{CompletedPart, IObjectStore, ObjectStat, PartUploadRequest};

use crate::azure::AzureClient;
use crate::gcs::GcsClient;
use crate::local::LocalClient;
use crate::s3::S3Client;

pub enum ObjectStoreClient {
    S3(S3Client),
    Azure(AzureClient),
    Gcs(GcsClient),
    Local(LocalClient),
}

impl ObjectStoreClient {
    /// Builds the variant matching `stage.provider`, sharing one
    /// `reqwest::Client` across the REST-backed providers. `local_root`
    /// is only consulted for `StageProvider::Local`.
    pub fn for_stage(stage: &StageInfo, http: reqwest::Client, local_root: &std::path::Path) -> Self {
        match stage.provider {
            StageProvider::S3 => ObjectStoreClient::S3(S3Client::new(http)),
            StageProvider::Azure => ObjectStoreClient::Azure(AzureClient::new(http)),
            StageProvider::Gcs => ObjectStoreClient::Gcs(GcsClient::new(http)),
            StageProvider::Local => ObjectStoreClient::Local(LocalClient::new(local_root)),
        }
    }
}

#[async_trait]
impl IObjectStore for ObjectStoreClient {
    async fn create_multipart_upload(&self, stage: &StageInfo, key: &str) -> Result<String, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.create_multipart_upload(stage, key).await,
            ObjectStoreClient::Azure(c) => c.create_multipart_upload(stage, key).await,
            ObjectStoreClient::Gcs(c) => c.create_multipart_upload(stage, key).await,
            ObjectStoreClient::Local(c) => c.create_multipart_upload(stage, key).await,
        }
    }

    async fn upload_part(
        &self,
        stage: &StageInfo,
        request: PartUploadRequest<'_>,
    ) -> Result<CompletedPart, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.upload_part(stage, request).await,
            ObjectStoreClient::Azure(c) => c.upload_part(stage, request).await,
            ObjectStoreClient::Gcs(c) => c.upload_part(stage, request).await,
            ObjectStoreClient::Local(c) => c.upload_part(stage, request).await,
        }
    }

    async fn complete_multipart_upload(
        &self,
        stage: &StageInfo,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<u64, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.complete_multipart_upload(stage, key, upload_id, parts).await,
            ObjectStoreClient::Azure(c) => c.complete_multipart_upload(stage, key, upload_id, parts).await,
            ObjectStoreClient::Gcs(c) => c.complete_multipart_upload(stage, key, upload_id, parts).await,
            ObjectStoreClient::Local(c) => c.complete_multipart_upload(stage, key, upload_id, parts).await,
        }
    }

    async fn put_object(&self, stage: &StageInfo, key: &str, body: Vec<u8>) -> Result<u64, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.put_object(stage, key, body).await,
            ObjectStoreClient::Azure(c) => c.put_object(stage, key, body).await,
            ObjectStoreClient::Gcs(c) => c.put_object(stage, key, body).await,
            ObjectStoreClient::Local(c) => c.put_object(stage, key, body).await,
        }
    }

    async fn get_object_range(
        &self,
        stage: &StageInfo,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.get_object_range(stage, key, start, end_inclusive).await,
            ObjectStoreClient::Azure(c) => c.get_object_range(stage, key, start, end_inclusive).await,
            ObjectStoreClient::Gcs(c) => c.get_object_range(stage, key, start, end_inclusive).await,
            ObjectStoreClient::Local(c) => c.get_object_range(stage, key, start, end_inclusive).await,
        }
    }

    async fn head_object(&self, stage: &StageInfo, key: &str) -> Result<ObjectStat, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.head_object(stage, key).await,
            ObjectStoreClient::Azure(c) => c.head_object(stage, key).await,
            ObjectStoreClient::Gcs(c) => c.head_object(stage, key).await,
            ObjectStoreClient::Local(c) => c.head_object(stage, key).await,
        }
    }

    async fn list_prefix(&self, stage: &StageInfo, prefix: &str) -> Result<Vec<String>, WarehouseError> {
        match self {
            ObjectStoreClient::S3(c) => c.list_prefix(stage, prefix).await,
            ObjectStoreClient::Azure(c) => c.list_prefix(stage, prefix).await,
            ObjectStoreClient::Gcs(c) => c.list_prefix(stage, prefix).await,
            ObjectStoreClient::Local(c) => c.list_prefix(stage, prefix).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_stage_picks_local_variant_for_local_provider() {
        let stage = StageInfo {
            provider: StageProvider::Local,
            bucket_or_container: "x".to_string(),
            path_prefix: String::new(),
            region: None,
            endpoint: None,
            storage_account: None,
            qmk: None,
        };
        let client = ObjectStoreClient::for_stage(&stage, reqwest::Client::new(), std::path::Path::new("/tmp"));
        assert!(matches!(client, ObjectStoreClient::Local(_)));
    }
}

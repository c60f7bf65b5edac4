//! S3-backed stage adapter (spec §4.4 Component H). Talks the plain S3
//! REST/XML multipart API. Presigned-URL issuance and per-request
//! signing live upstream of this crate (the control-plane response that
//! hands back a `StageInfo`/key pair already carries whatever query
//! string or host the caller needs); this adapter only shapes the HTTP
//! calls, matching the teacher's "authenticated `GraphClient`, raw
//! `reqwest::Client` for the signed URL" split in its upload session
//! code.

use async_trait::async_trait;
use warehouse_core::domain::{StageInfo, WarehouseError};
use warehouse_core::ports::{CompletedPart, IObjectStore, ObjectStat, PartUploadRequest};

use crate::key::{object_key, strip_stage_prefix};
use crate::xml_multipart;

pub struct S3Client {
    http: reqwest::Client,
}

impl S3Client {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn bucket_url(&self, stage: &StageInfo) -> String {
        if let Some(endpoint) = &stage.endpoint {
            endpoint.trim_end_matches('/').to_string()
        } else {
            let region = stage.region.as_deref().unwrap_or("us-east-1");
            format!("https://{}.s3.{region}.amazonaws.com", stage.bucket_or_container)
        }
    }

    fn object_url(&self, stage: &StageInfo, key: &str) -> String {
        format!("{}/{}", self.bucket_url(stage), object_key(stage, key))
    }
}

#[async_trait]
impl IObjectStore for S3Client {
    async fn create_multipart_upload(&self, stage: &StageInfo, key: &str) -> Result<String, WarehouseError> {
        xml_multipart::create_multipart_upload(&self.http, &self.object_url(stage, key)).await
    }

    async fn upload_part(
        &self,
        stage: &StageInfo,
        request: PartUploadRequest<'_>,
    ) -> Result<CompletedPart, WarehouseError> {
        let url = self.object_url(stage, request.key);
        xml_multipart::upload_part(&self.http, &url, request).await
    }

    async fn complete_multipart_upload(
        &self,
        stage: &StageInfo,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<u64, WarehouseError> {
        let url = self.object_url(stage, key);
        xml_multipart::complete_multipart_upload(&self.http, &url, upload_id, parts).await?;
        xml_multipart::head_object(&self.http, &url).await.map(|stat| stat.size)
    }

    async fn put_object(&self, stage: &StageInfo, key: &str, body: Vec<u8>) -> Result<u64, WarehouseError> {
        xml_multipart::put_object(&self.http, &self.object_url(stage, key), body).await
    }

    async fn get_object_range(
        &self,
        stage: &StageInfo,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, WarehouseError> {
        xml_multipart::get_object_range(&self.http, &self.object_url(stage, key), start, end_inclusive).await
    }

    async fn head_object(&self, stage: &StageInfo, key: &str) -> Result<ObjectStat, WarehouseError> {
        xml_multipart::head_object(&self.http, &self.object_url(stage, key)).await
    }

    async fn list_prefix(&self, stage: &StageInfo, prefix: &str) -> Result<Vec<String>, WarehouseError> {
        let keys = xml_multipart::list_prefix(&self.http, &self.bucket_url(stage), &object_key(stage, prefix)).await?;
        Ok(keys.iter().map(|k| strip_stage_prefix(stage, k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::StageProvider;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stage(endpoint: String) -> StageInfo {
        StageInfo {
            provider: StageProvider::S3,
            bucket_or_container: "my-bucket".to_string(),
            path_prefix: "stages/load1".to_string(),
            region: Some("us-west-2".to_string()),
            endpoint: Some(endpoint),
            storage_account: None,
            qmk: None,
        }
    }

    #[tokio::test]
    async fn put_object_posts_to_prefixed_key() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/stages/load1/file.csv"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = S3Client::new(reqwest::Client::new());
        let size = client
            .put_object(&stage(server.uri()), "file.csv", b"a,b,c".to_vec())
            .await
            .unwrap();
        assert_eq!(size, 5);
    }

    #[tokio::test]
    async fn head_object_reports_missing_as_terminal_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = S3Client::new(reqwest::Client::new());
        let err = client.head_object(&stage(server.uri()), "missing.csv").await.unwrap_err();
        assert!(matches!(err, WarehouseError::ObjectStore(_)));
    }
}

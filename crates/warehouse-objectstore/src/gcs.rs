//! Google Cloud Storage stage adapter. GCS's XML API is S3-interoperable
//! for the subset of multipart verbs this crate needs, so it shares
//! [`crate::xml_multipart`] with [`crate::s3::S3Client`] and differs only
//! in the default bucket host and listing query shape.

use async_trait::async_trait;
use warehouse_core::domain::{StageInfo, WarehouseError};
use warehouse_core::ports::{CompletedPart, IObjectStore, ObjectStat, PartUploadRequest};

use crate::key::{object_key, strip_stage_prefix};
use crate::retry::{with_retry, RetryOutcome};
use crate::xml_multipart;

pub struct GcsClient {
    http: reqwest::Client,
}

impl GcsClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn bucket_url(&self, stage: &StageInfo) -> String {
        if let Some(endpoint) = &stage.endpoint {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("https://storage.googleapis.com/{}", stage.bucket_or_container)
        }
    }

    fn object_url(&self, stage: &StageInfo, key: &str) -> String {
        format!("{}/{}", self.bucket_url(stage), object_key(stage, key))
    }

    fn json_api_url(&self, stage: &StageInfo, prefix: &str) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o?prefix={}",
            stage.bucket_or_container,
            object_key(stage, prefix)
        )
    }
}

#[async_trait]
impl IObjectStore for GcsClient {
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

    /// GCS's JSON API lists objects as `{"items": [{"name": "..."}]}`
    /// rather than the S3 XML shape, so listing doesn't go through
    /// `xml_multipart::list_prefix`.
    async fn list_prefix(&self, stage: &StageInfo, prefix: &str) -> Result<Vec<String>, WarehouseError> {
        let url = self.json_api_url(stage, prefix);
        let keys: Vec<String> = with_retry("list_prefix", |_attempt| {
            let url = url.clone();
            async move {
                let response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
                let status = response.status();
                if status.is_server_error() {
                    return Err(RetryOutcome::Retryable(format!("server error {status}")));
                }
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| RetryOutcome::Terminal(WarehouseError::ObjectStore(e.to_string())))?;
                if !status.is_success() {
                    return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                        "list prefix failed: {status}: {json}"
                    ))));
                }
                Ok(json
                    .get("items")
                    .and_then(|v| v.as_array())
                    .into_iter()
                    .flatten()
                    .filter_map(|item| item.get("name")?.as_str().map(str::to_string))
                    .collect())
            }
        })
        .await?;
        Ok(keys.iter().map(|k| strip_stage_prefix(stage, k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::StageProvider;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stage(endpoint: String) -> StageInfo {
        StageInfo {
            provider: StageProvider::Gcs,
            bucket_or_container: "my-bucket".to_string(),
            path_prefix: String::new(),
            region: None,
            endpoint: Some(endpoint),
            storage_account: None,
            qmk: None,
        }
    }

    #[tokio::test]
    async fn put_object_returns_uploaded_size() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = GcsClient::new(reqwest::Client::new());
        let size = client.put_object(&stage(server.uri()), "f.csv", vec![1, 2, 3, 4]).await.unwrap();
        assert_eq!(size, 4);
    }
}

//! The S3 XML multipart-upload REST shape, shared by [`crate::s3`] and
//! [`crate::gcs`] (GCS's XML API is S3-interoperable for this subset of
//! operations: initiate/upload-part/complete all take the same query
//! parameters and bodies).

use warehouse_core::domain::WarehouseError;
use warehouse_core::ports::{CompletedPart, ObjectStat, PartUploadRequest};

use crate::retry::{with_retry, RetryOutcome};
use crate::xml_lite::{all_tags, first_tag};

pub(crate) async fn create_multipart_upload(
    http: &reqwest::Client,
    object_url: &str,
) -> Result<String, WarehouseError> {
    with_retry("create_multipart_upload", |_attempt| async move {
        let response = http
            .post(format!("{object_url}?uploads"))
            .send()
            .await
            .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(RetryOutcome::Retryable(format!("server error {status}")));
        }
        if !status.is_success() {
            return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                "create multipart upload failed: {status}: {body}"
            ))));
        }
        first_tag(&body, "UploadId")
            .map(str::to_string)
            .ok_or_else(|| {
                RetryOutcome::Terminal(WarehouseError::ObjectStore(
                    "create multipart upload response missing UploadId".to_string(),
                ))
            })
    })
    .await
}

pub(crate) async fn upload_part(
    http: &reqwest::Client,
    object_url: &str,
    request: PartUploadRequest<'_>,
) -> Result<CompletedPart, WarehouseError> {
    let part_index = request.part_index;
    let upload_id = request.upload_id.to_string();
    let body = request.body;

    with_retry("upload_part", |_attempt| {
        let body = body.clone();
        let upload_id = upload_id.clone();
        async move {
            let response = http
                .put(format!(
                    "{object_url}?partNumber={}&uploadId={upload_id}",
                    part_index + 1
                ))
                .body(body)
                .send()
                .await
                .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
            let status = response.status();
            if status.is_server_error() {
                return Err(RetryOutcome::Retryable(format!("server error {status}")));
            }
            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim_matches('"').to_string());
            if !status.is_success() {
                return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                    "upload part {} failed: {status}",
                    part_index + 1
                ))));
            }
            let etag = etag.ok_or_else(|| {
                RetryOutcome::Terminal(WarehouseError::ObjectStore(
                    "upload part response missing ETag".to_string(),
                ))
            })?;
            Ok(CompletedPart { part_index, etag })
        }
    })
    .await
}

pub(crate) async fn complete_multipart_upload(
    http: &reqwest::Client,
    object_url: &str,
    upload_id: &str,
    parts: &[CompletedPart],
) -> Result<(), WarehouseError> {
    let mut body = String::from("<CompleteMultipartUpload>");
    for part in parts {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>\"{}\"</ETag></Part>",
            part.part_index + 1,
            part.etag
        ));
    }
    body.push_str("</CompleteMultipartUpload>");

    with_retry("complete_multipart_upload", |_attempt| {
        let body = body.clone();
        async move {
            let response = http
                .post(format!("{object_url}?uploadId={upload_id}"))
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body)
                .send()
                .await
                .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
            let status = response.status();
            if status.is_server_error() {
                return Err(RetryOutcome::Retryable(format!("server error {status}")));
            }
            if !status.is_success() {
                return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                    "complete multipart upload failed: {status}"
                ))));
            }
            Ok(())
        }
    })
    .await
}

pub(crate) async fn put_object(
    http: &reqwest::Client,
    object_url: &str,
    body: Vec<u8>,
) -> Result<u64, WarehouseError> {
    let len = body.len() as u64;
    with_retry("put_object", |_attempt| {
        let body = body.clone();
        async move {
            let response = http
                .put(object_url)
                .body(body)
                .send()
                .await
                .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
            let status = response.status();
            if status.is_server_error() {
                return Err(RetryOutcome::Retryable(format!("server error {status}")));
            }
            if !status.is_success() {
                return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                    "put object failed: {status}"
                ))));
            }
            Ok(len)
        }
    })
    .await
}

pub(crate) async fn get_object_range(
    http: &reqwest::Client,
    object_url: &str,
    start: u64,
    end_inclusive: u64,
) -> Result<Vec<u8>, WarehouseError> {
    with_retry("get_object_range", |_attempt| async move {
        let response = http
            .get(object_url)
            .header(reqwest::header::RANGE, format!("bytes={start}-{end_inclusive}"))
            .send()
            .await
            .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(RetryOutcome::Retryable(format!("server error {status}")));
        }
        if !status.is_success() {
            return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                "ranged get failed: {status}"
            ))));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| RetryOutcome::Terminal(WarehouseError::ObjectStore(e.to_string())))
    })
    .await
}

pub(crate) async fn head_object(
    http: &reqwest::Client,
    object_url: &str,
) -> Result<ObjectStat, WarehouseError> {
    with_retry("head_object", |_attempt| async move {
        let response = http
            .head(object_url)
            .send()
            .await
            .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(RetryOutcome::Retryable(format!("server error {status}")));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                "object not found: {object_url}"
            ))));
        }
        if !status.is_success() {
            return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                "head object failed: {status}"
            ))));
        }
        let size = response.content_length().unwrap_or(0);
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        Ok(ObjectStat { size, etag })
    })
    .await
}

pub(crate) async fn list_prefix(
    http: &reqwest::Client,
    bucket_url: &str,
    prefix: &str,
) -> Result<Vec<String>, WarehouseError> {
    with_retry("list_prefix", |_attempt| async move {
        let response = http
            .get(format!("{bucket_url}?list-type=2&prefix={prefix}"))
            .send()
            .await
            .map_err(|e| RetryOutcome::Retryable(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(RetryOutcome::Retryable(format!("server error {status}")));
        }
        if !status.is_success() {
            return Err(RetryOutcome::Terminal(WarehouseError::ObjectStore(format!(
                "list prefix failed: {status}"
            ))));
        }
        Ok(all_tags(&body, "Key").into_iter().map(str::to_string).collect())
    })
    .await
}

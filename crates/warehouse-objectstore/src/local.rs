//! Filesystem-backed stage adapter. Used for internal stages and as the
//! target the driver's own presigned-URL issuance path writes to in
//! tests, standing in for a real provider without a network dependency
//! (spec §4.4: "`Local` adapter for internal stages backed by the
//! driver's own presigned-URL issuance path in tests").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use warehouse_core::domain::{StageInfo, WarehouseError};
use warehouse_core::ports::{CompletedPart, IObjectStore, ObjectStat, PartUploadRequest};

use crate::key::{object_key, strip_stage_prefix};

pub struct LocalClient {
    root: PathBuf,
}

impl LocalClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, stage: &StageInfo, key: &str) -> PathBuf {
        self.root.join(object_key(stage, key))
    }

    fn parts_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(".multipart").join(upload_id)
    }

    fn io_err(context: &str, err: std::io::Error) -> WarehouseError {
        WarehouseError::ObjectStore(format!("{context}: {err}"))
    }
}

#[async_trait]
impl IObjectStore for LocalClient {
    async fn create_multipart_upload(&self, _stage: &StageInfo, key: &str) -> Result<String, WarehouseError> {
        let upload_id = format!("{:x}", Sha256::digest(key.as_bytes()));
        fs::create_dir_all(self.parts_dir(&upload_id))
            .await
            .map_err(|e| Self::io_err("create multipart staging dir", e))?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _stage: &StageInfo,
        request: PartUploadRequest<'_>,
    ) -> Result<CompletedPart, WarehouseError> {
        let path = self.parts_dir(request.upload_id).join(format!("{:08}.part", request.part_index));
        fs::write(&path, &request.body)
            .await
            .map_err(|e| Self::io_err("write part", e))?;
        let etag = format!("{:x}", Sha256::digest(&request.body));
        Ok(CompletedPart {
            part_index: request.part_index,
            etag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        stage: &StageInfo,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<u64, WarehouseError> {
        let dest = self.object_path(stage, key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::io_err("create object dir", e))?;
        }

        let mut sorted: Vec<&CompletedPart> = parts.iter().collect();
        sorted.sort_by_key(|p| p.part_index);

        let mut out = fs::File::create(&dest).await.map_err(|e| Self::io_err("create destination file", e))?;
        let mut total = 0u64;
        for part in sorted {
            let part_path = self.parts_dir(upload_id).join(format!("{:08}.part", part.part_index));
            let bytes = fs::read(&part_path).await.map_err(|e| Self::io_err("read part", e))?;
            total += bytes.len() as u64;
            out.write_all(&bytes).await.map_err(|e| Self::io_err("append part", e))?;
        }
        out.flush().await.map_err(|e| Self::io_err("flush destination file", e))?;

        fs::remove_dir_all(self.parts_dir(upload_id)).await.ok();
        Ok(total)
    }

    async fn put_object(&self, stage: &StageInfo, key: &str, body: Vec<u8>) -> Result<u64, WarehouseError> {
        let dest = self.object_path(stage, key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::io_err("create object dir", e))?;
        }
        let len = body.len() as u64;
        fs::write(&dest, body).await.map_err(|e| Self::io_err("write object", e))?;
        Ok(len)
    }

    async fn get_object_range(
        &self,
        stage: &StageInfo,
        key: &str,
        start: u64,
        end_inclusive: u64,
    ) -> Result<Vec<u8>, WarehouseError> {
        let path = self.object_path(stage, key);
        let mut file = fs::File::open(&path).await.map_err(|e| Self::io_err("open object", e))?;
        file.seek(SeekFrom::Start(start)).await.map_err(|e| Self::io_err("seek object", e))?;
        let want = (end_inclusive - start + 1) as usize;
        let mut buf = vec![0u8; want];
        file.read_exact(&mut buf).await.map_err(|e| Self::io_err("read object range", e))?;
        Ok(buf)
    }

    async fn head_object(&self, stage: &StageInfo, key: &str) -> Result<ObjectStat, WarehouseError> {
        let path = self.object_path(stage, key);
        let metadata = fs::metadata(&path).await.map_err(|e| Self::io_err("stat object", e))?;
        let body = fs::read(&path).await.map_err(|e| Self::io_err("read object for etag", e))?;
        Ok(ObjectStat {
            size: metadata.len(),
            etag: Some(format!("{:x}", Sha256::digest(&body))),
        })
    }

    async fn list_prefix(&self, stage: &StageInfo, prefix: &str) -> Result<Vec<String>, WarehouseError> {
        let full_prefix = object_key(stage, prefix);
        let mut keys = Vec::new();
        walk(&self.root, &self.root, &full_prefix, &mut keys)
            .await
            .map_err(|e| Self::io_err("list prefix", e))?;
        Ok(keys.iter().map(|k| strip_stage_prefix(stage, k)).collect())
    }
}

fn walk<'a>(
    root: &'a Path,
    dir: &'a Path,
    prefix: &'a str,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if dir.file_name().map(|n| n == ".multipart").unwrap_or(false) {
            return Ok(());
        }
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, prefix, out).await?;
            } else {
                let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
                if relative.starts_with(prefix) {
                    out.push(relative);
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::StageProvider;

    fn stage() -> StageInfo {
        StageInfo {
            provider: StageProvider::Local,
            bucket_or_container: "local".to_string(),
            path_prefix: "stage1".to_string(),
            region: None,
            endpoint: None,
            storage_account: None,
            qmk: None,
        }
    }

    #[tokio::test]
    async fn put_then_head_round_trips_size_and_etag() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalClient::new(dir.path());
        let size = client.put_object(&stage(), "a.csv", b"1,2,3".to_vec()).await.unwrap();
        assert_eq!(size, 5);

        let stat = client.head_object(&stage(), "a.csv").await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.etag.is_some());
    }

    #[tokio::test]
    async fn multipart_upload_concatenates_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalClient::new(dir.path());
        let upload_id = client.create_multipart_upload(&stage(), "big.csv").await.unwrap();

        let part1 = client
            .upload_part(
                &stage(),
                PartUploadRequest {
                    key: "big.csv",
                    part_index: 1,
                    upload_id: &upload_id,
                    body: b"world".to_vec(),
                },
            )
            .await
            .unwrap();
        let part0 = client
            .upload_part(
                &stage(),
                PartUploadRequest {
                    key: "big.csv",
                    part_index: 0,
                    upload_id: &upload_id,
                    body: b"hello".to_vec(),
                },
            )
            .await
            .unwrap();

        let total = client
            .complete_multipart_upload(&stage(), "big.csv", &upload_id, &[part1, part0])
            .await
            .unwrap();
        assert_eq!(total, 10);

        let body = client.get_object_range(&stage(), "big.csv", 0, 9).await.unwrap();
        assert_eq!(body, b"helloworld");
    }

    #[tokio::test]
    async fn list_prefix_finds_matching_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalClient::new(dir.path());
        client.put_object(&stage(), "a.csv", b"x".to_vec()).await.unwrap();
        client.put_object(&stage(), "b.csv", b"y".to_vec()).await.unwrap();

        let keys = client.list_prefix(&stage(), "a").await.unwrap();
        assert_eq!(keys, vec!["a.csv".to_string()]);
    }
}

//! `FileTransferAgent`: drives a resolved [`FileTransferPlan`] through
//! compression, digesting, encryption and upload/download against an
//! [`IObjectStore`] (spec §4.4). Mirrors the teacher's chunked-upload
//! orchestration (session URL, part loop, progress) generalised to three
//! backends instead of one and to both directions (PUT and GET).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use warehouse_core::domain::{
    Compression, FileMeta, FileResultStatus, FileTransferPlan, StagePath, TransferCommand, WarehouseError,
};
use warehouse_core::ports::{IObjectStore, PartUploadRequest};

use crate::compression::{gzip, should_gzip, sniff_compression};
use crate::digest::digest_bytes;
use crate::encryption::{CipherMode, FileKey};
use crate::partition::{concurrency_policy, plan_parts, ConcurrencyPolicy, DEFAULT_PART_SIZE_BYTES};
use crate::status::classify_object_store_failure;

const MAX_ATTEMPTS_PER_FILE: u32 = 5;

pub struct FileTransferAgent {
    objects: Arc<dyn IObjectStore>,
    part_size: u64,
}

impl FileTransferAgent {
    pub fn new(objects: Arc<dyn IObjectStore>) -> Self {
        Self {
            objects,
            part_size: DEFAULT_PART_SIZE_BYTES,
        }
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub async fn execute(&self, plan: &FileTransferPlan) -> Result<Vec<FileMeta>, WarehouseError> {
        match plan.command {
            TransferCommand::Put => self.execute_put(plan).await,
            TransferCommand::Get => self.execute_get(plan).await,
        }
    }

    async fn execute_put(&self, plan: &FileTransferPlan) -> Result<Vec<FileMeta>, WarehouseError> {
        let mut local_paths = Vec::new();
        for pattern in &plan.sources {
            let matches = glob::glob(pattern)
                .map_err(|e| WarehouseError::InvalidTransferCommand(format!("bad glob {pattern}: {e}")))?;
            for entry in matches {
                let path = entry.map_err(|e| WarehouseError::FileTransferFailed {
                    path: pattern.clone(),
                    message: e.to_string(),
                })?;
                if path.is_file() {
                    local_paths.push(path);
                }
            }
        }

        if local_paths.is_empty() {
            return Err(WarehouseError::InvalidTransferCommand(format!(
                "no local files matched {:?}",
                plan.sources
            )));
        }

        let semaphore = Arc::new(Semaphore::new(plan.parallel.max(1)));
        let mut tasks = Vec::new();
        for path in local_paths {
            let semaphore = semaphore.clone();
            let objects = self.objects.clone();
            let plan = plan.clone();
            let part_size = self.part_size;
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                upload_one(objects.as_ref(), &plan, &path, part_size).await
            }));
        }

        let mut metas = Vec::with_capacity(tasks.len());
        for task in tasks {
            metas.push(task.await.map_err(|e| {
                WarehouseError::FileTransferFailed {
                    path: "<unknown>".to_string(),
                    message: format!("upload task panicked: {e}"),
                }
            })??);
        }
        Ok(metas)
    }

    async fn execute_get(&self, plan: &FileTransferPlan) -> Result<Vec<FileMeta>, WarehouseError> {
        let destination_dir = PathBuf::from(plan.destination.as_str());
        tokio::fs::create_dir_all(&destination_dir)
            .await
            .map_err(|e| WarehouseError::FileTransferFailed {
                path: destination_dir.display().to_string(),
                message: e.to_string(),
            })?;

        let mut keys = Vec::new();
        for pattern in &plan.sources {
            keys.extend(self.objects.list_prefix(&plan.stage, pattern).await?);
        }
        keys.sort();
        keys.dedup();

        if keys.is_empty() {
            return Err(WarehouseError::InvalidTransferCommand(format!(
                "no stage objects matched {:?}",
                plan.sources
            )));
        }

        let semaphore = Arc::new(Semaphore::new(plan.parallel.max(1)));
        let mut tasks = Vec::new();
        for key in keys {
            let semaphore = semaphore.clone();
            let objects = self.objects.clone();
            let plan = plan.clone();
            let destination_dir = destination_dir.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                download_one(objects.as_ref(), &plan, &key, &destination_dir).await
            }));
        }

        let mut metas = Vec::with_capacity(tasks.len());
        for task in tasks {
            metas.push(task.await.map_err(|e| WarehouseError::FileTransferFailed {
                path: "<unknown>".to_string(),
                message: format!("download task panicked: {e}"),
            })??);
        }
        Ok(metas)
    }
}

async fn upload_one(
    objects: &dyn IObjectStore,
    plan: &FileTransferPlan,
    local_path: &Path,
    part_size: u64,
) -> Result<FileMeta, WarehouseError> {
    let file_name = local_path.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string();

    let raw = tokio::fs::read(local_path).await.map_err(|e| WarehouseError::FileTransferFailed {
        path: local_path.display().to_string(),
        message: e.to_string(),
    })?;
    let src_size = raw.len() as u64;

    let sniffed = sniff_compression(&file_name, &raw[..raw.len().min(8)]);
    let mut meta = FileMeta::new(file_name.clone(), src_size, sniffed);
    meta.dst_name = format!("{file_name}{}", if should_gzip(sniffed, plan.auto_compress) { ".gz" } else { "" });

    let payload = if should_gzip(sniffed, plan.auto_compress) {
        meta.dst_compression = Compression::Gzip;
        gzip(&raw).map_err(|e| WarehouseError::FileTransferFailed {
            path: local_path.display().to_string(),
            message: format!("gzip failed: {e}"),
        })?
    } else {
        meta.dst_compression = sniffed;
        raw
    };

    meta.digest = Some(digest_bytes(&payload)?);

    let (upload_bytes, encryption) = match &plan.stage.qmk {
        Some(qmk) => {
            let mode = CipherMode::for_provider(plan.stage.provider);
            let key = FileKey::generate(mode);
            let ciphertext = key.encrypt(&payload)?;
            let material = key.wrap(qmk)?;
            (ciphertext, Some(material))
        }
        None => (payload, None),
    };
    meta.encryption = encryption;
    meta.upload_size = Some(upload_bytes.len() as u64);

    // `IObjectStore` methods join `stage.path_prefix` onto the key themselves
    // (the same way `list_prefix` strips it back off), so the key handed to
    // them here is relative to the stage, not the full object path.
    let key = meta.dst_name.clone();

    if !plan.overwrite {
        if objects.head_object(&plan.stage, &key).await.is_ok() {
            meta.transition(FileResultStatus::Collision)?;
            return Ok(meta);
        }
    }

    let mut attempt = 0u32;
    loop {
        let policy = concurrency_policy(upload_bytes.len() as u64, plan.parallel, plan.part_parallelism);
        let outcome = match policy {
            ConcurrencyPolicy::WholeFilesConcurrently { .. } => {
                objects.put_object(&plan.stage, &key, upload_bytes.clone()).await
            }
            ConcurrencyPolicy::PartsInParallel { .. } => {
                upload_multipart(objects, plan, &key, &upload_bytes, part_size).await
            }
        };

        match outcome {
            Ok(_) => {
                meta.transition(FileResultStatus::Uploaded)?;
                return Ok(meta);
            }
            Err(err) => {
                let next = classify_object_store_failure(&err, attempt, plan.parallel);
                attempt += 1;
                let terminal = next.is_terminal();
                meta.transition(next)?;
                if terminal {
                    return Ok(meta);
                }
                if attempt >= MAX_ATTEMPTS_PER_FILE {
                    meta.transition(FileResultStatus::Error {
                        message: format!("upload failed after {attempt} attempt(s): {err}"),
                    })?;
                    return Ok(meta);
                }
            }
        }
    }
}

async fn upload_multipart(
    objects: &dyn IObjectStore,
    plan: &FileTransferPlan,
    key: &str,
    bytes: &[u8],
    part_size: u64,
) -> Result<(), WarehouseError> {
    let upload_id = objects.create_multipart_upload(&plan.stage, key).await?;
    let ranges = plan_parts(bytes.len() as u64, part_size);

    let mut parts = Vec::with_capacity(ranges.len());
    for (index, (start, end)) in ranges.into_iter().enumerate() {
        let body = bytes[start as usize..=end as usize].to_vec();
        let completed = objects
            .upload_part(
                &plan.stage,
                PartUploadRequest {
                    key,
                    part_index: index as u32,
                    upload_id: &upload_id,
                    body,
                },
            )
            .await?;
        parts.push(completed);
    }

    objects.complete_multipart_upload(&plan.stage, key, &upload_id, &parts).await?;
    Ok(())
}

async fn download_one(
    objects: &dyn IObjectStore,
    plan: &FileTransferPlan,
    stage_key: &str,
    destination_dir: &Path,
) -> Result<FileMeta, WarehouseError> {
    let file_name = StagePath::new(stage_key.to_string())?.file_name().to_string();
    let mut meta = FileMeta::new(file_name.clone(), 0, Compression::None);

    let mut attempt = 0u32;
    let stat = loop {
        match objects.head_object(&plan.stage, stage_key).await {
            Ok(stat) => break stat,
            Err(err) => {
                let next = classify_object_store_failure(&err, attempt, plan.parallel);
                attempt += 1;
                let terminal = next.is_terminal() || attempt >= MAX_ATTEMPTS_PER_FILE;
                meta.transition(next)?;
                if terminal {
                    return Ok(meta);
                }
                continue;
            }
        }
    };
    meta.src_size = stat.size;
    let dest_path = destination_dir.join(&file_name);

    let mut attempt = 0u32;
    loop {
        let body = if stat.size == 0 {
            Ok(Vec::new())
        } else {
            objects.get_object_range(&plan.stage, stage_key, 0, stat.size - 1).await
        };

        match body {
            Ok(body) => {
                tokio::fs::write(&dest_path, &body).await.map_err(|e| WarehouseError::FileTransferFailed {
                    path: dest_path.display().to_string(),
                    message: e.to_string(),
                })?;
                meta.upload_size = Some(body.len() as u64);
                meta.digest = Some(digest_bytes(&body)?);
                meta.transition(FileResultStatus::Downloaded)?;
                return Ok(meta);
            }
            Err(err) => {
                let next = classify_object_store_failure(&err, attempt, plan.parallel);
                attempt += 1;
                let terminal = next.is_terminal();
                meta.transition(next)?;
                if terminal || attempt >= MAX_ATTEMPTS_PER_FILE {
                    if !meta.status.is_terminal() {
                        meta.transition(FileResultStatus::Error {
                            message: format!("download failed after {attempt} attempt(s): {err}"),
                        })?;
                    }
                    return Ok(meta);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warehouse_core::domain::{StageInfo, StageProvider};
    use warehouse_objectstore::LocalClient;

    fn stage(path_prefix: &str, qmk: Option<String>) -> StageInfo {
        StageInfo {
            provider: StageProvider::Local,
            bucket_or_container: "local".to_string(),
            path_prefix: path_prefix.to_string(),
            region: None,
            endpoint: None,
            storage_account: None,
            qmk,
        }
    }

    fn plan(sources: Vec<String>, destination: &str, stage: StageInfo) -> FileTransferPlan {
        FileTransferPlan {
            command: TransferCommand::Put,
            stage,
            sources,
            destination: StagePath::new(destination.to_string()).unwrap(),
            parallel: 2,
            part_parallelism: 2,
            auto_compress: true,
            source_compression: None,
            overwrite: true,
        }
    }

    #[tokio::test]
    async fn uploads_a_small_plaintext_file() {
        let local_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let src = local_dir.path().join("data.csv");
        tokio::fs::write(&src, b"a,b,c\n1,2,3\n").await.unwrap();

        let objects: Arc<dyn IObjectStore> = Arc::new(LocalClient::new(store_dir.path()));
        let agent = FileTransferAgent::new(objects);

        let mut put_plan = plan(vec![src.to_string_lossy().to_string()], "out", stage("stage1", None));
        put_plan.auto_compress = false;

        let metas = agent.execute(&put_plan).await.unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].status, FileResultStatus::Uploaded);
        assert_eq!(metas[0].dst_name, "data.csv");
    }

    #[tokio::test]
    async fn uploads_and_encrypts_when_stage_has_a_qmk() {
        let local_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let src = local_dir.path().join("secret.csv");
        tokio::fs::write(&src, b"super secret row data").await.unwrap();

        let objects: Arc<dyn IObjectStore> = Arc::new(LocalClient::new(store_dir.path()));
        let agent = FileTransferAgent::new(objects);

        let mut put_plan = plan(
            vec![src.to_string_lossy().to_string()],
            "out",
            stage("stage1", Some(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"a-query-master-key"))),
        );
        put_plan.auto_compress = false;

        let metas = agent.execute(&put_plan).await.unwrap();
        assert_eq!(metas[0].status, FileResultStatus::Uploaded);
        assert!(metas[0].encryption.is_some());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_file_contents() {
        let local_dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let download_dir = tempfile::tempdir().unwrap();
        let src = local_dir.path().join("roundtrip.csv");
        tokio::fs::write(&src, b"x,y\n9,9\n").await.unwrap();

        let objects: Arc<dyn IObjectStore> = Arc::new(LocalClient::new(store_dir.path()));
        let agent = FileTransferAgent::new(objects);

        let mut put_plan = plan(vec![src.to_string_lossy().to_string()], "out", stage("stage1", None));
        put_plan.auto_compress = false;
        agent.execute(&put_plan).await.unwrap();

        let mut get_plan = plan(
            vec!["roundtrip.csv".to_string()],
            download_dir.path().to_str().unwrap(),
            stage("stage1", None),
        );
        get_plan.command = TransferCommand::Get;

        let metas = agent.execute(&get_plan).await.unwrap();
        assert_eq!(metas[0].status, FileResultStatus::Downloaded);

        let roundtripped = tokio::fs::read(download_dir.path().join("roundtrip.csv")).await.unwrap();
        assert_eq!(roundtripped, b"x,y\n9,9\n");
    }
}

//! File transfer domain shapes: `FileTransferPlan`, `FileMeta` and the
//! per-file result status machine (spec §3.1, §4.4, Invariant 3.2.6).

use serde::{Deserialize, Serialize};

use super::errors::WarehouseError;
use super::newtypes::{Sha256Digest, StagePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferCommand {
    Put,
    Get,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageProvider {
    S3,
    Azure,
    Gcs,
    Local,
}

/// Compression codec recognised by extension/prefix sniffing (spec §4.4
/// step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bz2,
    Zstd,
    Brotli,
    Deflate,
    Parquet,
    Orc,
}

impl Compression {
    /// Whether this codec is self-describing enough that auto-compress
    /// should skip re-compressing the file (spec §4.4 step 1).
    pub fn is_precompressed(self) -> bool {
        !matches!(self, Compression::None)
    }
}

/// Stage location and credential material for one transfer (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInfo {
    pub provider: StageProvider,
    pub bucket_or_container: String,
    pub path_prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub storage_account: Option<String>,
    /// Query Master Key used to wrap per-file data keys (spec §4.4 step 4).
    pub qmk: Option<String>,
}

/// Per-file symmetric key material, wrapped with the stage's QMK
/// (spec §4.4 step 4).
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptionMaterial {
    pub wrapped_key: String,
    pub iv: String,
}

impl std::fmt::Debug for EncryptionMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionMaterial")
            .field("wrapped_key", &"<redacted>")
            .field("iv", &self.iv)
            .finish()
    }
}

/// The parsed and server-planned shape of a `PUT`/`GET` command
/// (spec §3.1 `FileTransferPlan`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferPlan {
    pub command: TransferCommand,
    pub stage: StageInfo,
    /// Local glob patterns for PUT, or stage-relative paths for GET.
    pub sources: Vec<String>,
    pub destination: StagePath,
    pub parallel: usize,
    pub part_parallelism: usize,
    pub auto_compress: bool,
    pub source_compression: Option<Compression>,
    pub overwrite: bool,
}

/// Per-file result status machine (spec §3.1, Invariant 3.2.6): monotonic
/// from `Pending` to a terminal status, except the retry/renew statuses,
/// which permit a bounded number of re-attempts before becoming terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileResultStatus {
    Pending,
    Uploaded,
    Downloaded,
    Skipped { reason: String },
    Collision,
    Error { message: String },
    RenewToken,
    RenewPresignedUrl,
    NotFoundFile,
    NeedRetry { attempt: u32 },
    NeedRetryWithLowerConcurrency { attempt: u32, parallelism: usize },
}

impl FileResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileResultStatus::Uploaded
                | FileResultStatus::Downloaded
                | FileResultStatus::Skipped { .. }
                | FileResultStatus::Collision
                | FileResultStatus::Error { .. }
                | FileResultStatus::NotFoundFile
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FileResultStatus::RenewToken
                | FileResultStatus::RenewPresignedUrl
                | FileResultStatus::NeedRetry { .. }
                | FileResultStatus::NeedRetryWithLowerConcurrency { .. }
        )
    }

    /// Validates the monotonic transition rule of Invariant 3.2.6:
    /// terminal statuses never transition again; retryable statuses may
    /// transition to any other status (including back to a retry status,
    /// one attempt higher).
    pub fn validate_transition(&self, next: &FileResultStatus) -> Result<(), WarehouseError> {
        if self.is_terminal() {
            return Err(WarehouseError::InvalidState {
                from: format!("{self:?}"),
                to: format!("{next:?}"),
            });
        }
        Ok(())
    }
}

/// One file's progress through the transfer pipeline (spec §3.1
/// `FileMeta`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub src_name: String,
    pub src_size: u64,
    pub required_compression: Compression,
    pub dst_name: String,
    pub dst_compression: Compression,
    pub upload_size: Option<u64>,
    pub digest: Option<Sha256Digest>,
    pub encryption: Option<EncryptionMaterial>,
    pub status: FileResultStatus,
    pub retry_count: u32,
}

impl FileMeta {
    pub fn new(src_name: impl Into<String>, src_size: u64, compression: Compression) -> Self {
        let src_name = src_name.into();
        Self {
            dst_name: src_name.clone(),
            src_name,
            src_size,
            required_compression: compression,
            dst_compression: Compression::None,
            upload_size: None,
            digest: None,
            encryption: None,
            status: FileResultStatus::Pending,
            retry_count: 0,
        }
    }

    pub fn transition(&mut self, next: FileResultStatus) -> Result<(), WarehouseError> {
        self.status.validate_transition(&next)?;
        if next.is_retryable() {
            self.retry_count += 1;
        }
        self.status = next;
        Ok(())
    }
}

/// One row of the synthetic result set returned for a PUT/GET (spec §4.4
/// "Result shape"), in the fixed column order the spec mandates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResultRow {
    pub source: String,
    pub target: String,
    pub source_size: u64,
    pub target_size: Option<u64>,
    pub source_compression: Compression,
    pub target_compression: Compression,
    pub status: FileResultStatus,
    pub message: Option<String>,
}

/// Builds the synthetic result set sorted by source file name ascending.
pub fn build_transfer_result_set(files: &[FileMeta]) -> Vec<TransferResultRow> {
    let mut rows: Vec<TransferResultRow> = files
        .iter()
        .map(|f| TransferResultRow {
            source: f.src_name.clone(),
            target: f.dst_name.clone(),
            source_size: f.src_size,
            target_size: f.upload_size,
            source_compression: f.required_compression,
            target_compression: f.dst_compression,
            status: f.status.clone(),
            message: match &f.status {
                FileResultStatus::Error { message } => Some(message.clone()),
                FileResultStatus::Skipped { reason } => Some(reason.clone()),
                _ => None,
            },
        })
        .collect();
    rows.sort_by(|a, b| a.source.cmp(&b.source));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_rejects_further_transitions() {
        let mut meta = FileMeta::new("a.csv", 100, Compression::None);
        meta.transition(FileResultStatus::Uploaded).unwrap();
        assert!(meta.transition(FileResultStatus::NeedRetry { attempt: 1 }).is_err());
    }

    #[test]
    fn retry_statuses_are_not_terminal_and_increment_count() {
        let mut meta = FileMeta::new("a.csv", 100, Compression::None);
        meta.transition(FileResultStatus::NeedRetry { attempt: 1 })
            .unwrap();
        assert_eq!(meta.retry_count, 1);
        assert!(!meta.status.is_terminal());
        meta.transition(FileResultStatus::Uploaded).unwrap();
        assert!(meta.status.is_terminal());
    }

    #[test]
    fn result_set_sorted_by_source_name() {
        let mut b = FileMeta::new("b.csv", 1, Compression::None);
        b.transition(FileResultStatus::Uploaded).unwrap();
        let mut a = FileMeta::new("a.csv", 1, Compression::None);
        a.transition(FileResultStatus::Uploaded).unwrap();
        let rows = build_transfer_result_set(&[b, a]);
        assert_eq!(rows[0].source, "a.csv");
        assert_eq!(rows[1].source, "b.csv");
    }

    #[test]
    fn error_status_carries_message_into_result_row() {
        let mut meta = FileMeta::new("bad.csv", 1, Compression::None);
        meta.transition(FileResultStatus::Error {
            message: "not found".into(),
        })
        .unwrap();
        let rows = build_transfer_result_set(&[meta]);
        assert_eq!(rows[0].message.as_deref(), Some("not found"));
    }
}

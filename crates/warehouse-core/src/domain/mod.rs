//! Domain entities and business logic.
//!
//! Pure types and state machines for the session/query/transfer protocol:
//! - Newtypes for type-safe identifiers and validated strings
//! - Session and token-triple lifecycle
//! - Query status and result-descriptor shapes
//! - The query-context cache
//! - File-transfer plan and per-file result status
//! - The cross-cutting error taxonomy

pub mod context_cache;
pub mod errors;
pub mod newtypes;
pub mod query;
pub mod session;
pub mod transfer;

pub use context_cache::{QueryContextCache, QueryContextEntry};
pub use errors::{ServerErrorContext, WarehouseError};
pub use newtypes::*;
pub use query::{ChunkRef, ColumnMeta, ColumnType, ResultDescriptor, ResultFormat, RowBatch, RowsCursor};
pub use session::{QueryStatus, SessionState, TokenTriple};
pub use transfer::{
    build_transfer_result_set, Compression, EncryptionMaterial, FileMeta, FileResultStatus,
    FileTransferPlan, StageInfo, StageProvider, TransferCommand, TransferResultRow,
};

//! Result-set domain shapes: column metadata, chunk references, and the
//! `RowsCursor` contract the chunk downloader fulfils (spec §3.1, §4.2).

use serde::{Deserialize, Serialize};

use super::errors::WarehouseError;
use super::newtypes::QueryId;

/// Nominal server column type, mapped to a presented scalar by the chunk
/// decoder per the fixed table in spec §4.2. Column-internal binary
/// decoding beyond this tag is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Boolean,
    Text,
    Real,
    Fixed,
    Date,
    Time,
    TimestampLtz,
    TimestampNtz,
    TimestampTz,
    Binary,
    Variant,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    pub byte_length: Option<u64>,
}

/// A reference to one additional row chunk (spec §3.1). Invariant: the
/// position of a `ChunkRef` in [`ResultDescriptor::chunks`] equals its row
/// order relative to the other chunks and the inline batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRef {
    pub url: String,
    pub uncompressed_byte_length: u64,
    pub row_count: u64,
    /// Extra headers the presigned URL's issuer requires on the chunk GET
    /// (spec §4.2 "per-chunk HTTP headers").
    pub headers: Vec<(String, String)>,
}

/// Server-side row-set wire format for a chunk or the inline batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    JsonRowSet,
    ColumnarBinary,
}

/// Everything needed to materialise one statement's rows (spec §3.1
/// `ResultDescriptor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub query_id: QueryId,
    pub columns: Vec<ColumnMeta>,
    /// Rows returned inline with the submit/poll response, before any
    /// chunk is fetched.
    pub inline_rows: Vec<Vec<Option<String>>>,
    pub chunks: Vec<ChunkRef>,
    pub format: ResultFormat,
    /// Query Master Key wrapping per-chunk decryption keys, when the
    /// server encrypts chunk payloads.
    pub qrmk: Option<String>,
    pub total_row_count: u64,
    pub sql_state: Option<String>,
    /// Child query ids for `MULTI_STATEMENT_COUNT > 1` (spec §4.1
    /// "statementHandles"), in execution order.
    pub statement_handles: Vec<QueryId>,
}

impl ResultDescriptor {
    /// Invariant 3.2.2 validation helper: a chunk list with no inline rows
    /// and no chunks is a legitimate empty result (spec §8 boundary case),
    /// not a protocol error.
    pub fn is_empty(&self) -> bool {
        self.inline_rows.is_empty() && self.chunks.is_empty()
    }

    pub fn has_more_statements(&self, current_index: usize) -> bool {
        current_index + 1 < self.statement_handles.len()
    }
}

/// One materialised row batch, either the inline batch or a decoded chunk.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub chunk_index: Option<usize>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// The cursor contract a `warehouse-chunks` downloader fulfils for
/// `warehouse-session` to hand to the host adapter (spec §3.1 `RowsCursor`,
/// kept as a trait so the core stays I/O-free: the concrete prefetching
/// implementation lives in `warehouse-chunks`).
pub trait RowsCursor: Send {
    /// Advances to and returns the next row, or `None` at end of result
    /// set. Exactly one statement's worth of rows is materialised at a
    /// time (Invariant 3.2.2).
    fn next(&mut self) -> Result<Option<Vec<Option<String>>>, WarehouseError>;

    fn column_types(&self) -> &[ColumnMeta];

    /// Advances to the next child result set of a multi-statement
    /// response, if any (spec §4.1).
    fn next_result_set(&mut self) -> Result<bool, WarehouseError>;

    /// Releases chunk buffers and cancels any in-flight prefetch.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(chunks: usize, inline: usize) -> ResultDescriptor {
        ResultDescriptor {
            query_id: QueryId::new("q1").unwrap(),
            columns: vec![ColumnMeta {
                name: "N".into(),
                column_type: ColumnType::Fixed,
                precision: Some(38),
                scale: Some(0),
                nullable: false,
                byte_length: None,
            }],
            inline_rows: (0..inline).map(|i| vec![Some(i.to_string())]).collect(),
            chunks: (0..chunks)
                .map(|i| ChunkRef {
                    url: format!("https://example.invalid/chunk{i}"),
                    uncompressed_byte_length: 100,
                    row_count: 1,
                    headers: vec![],
                })
                .collect(),
            format: ResultFormat::JsonRowSet,
            qrmk: None,
            total_row_count: (chunks + inline) as u64,
            sql_state: None,
            statement_handles: vec![],
        }
    }

    #[test]
    fn empty_descriptor_has_no_rows_and_no_error() {
        let d = descriptor(0, 0);
        assert!(d.is_empty());
    }

    #[test]
    fn non_empty_descriptor_reports_not_empty() {
        let d = descriptor(0, 1);
        assert!(!d.is_empty());
    }

    #[test]
    fn statement_handles_chaining_boundary() {
        let mut d = descriptor(0, 1);
        d.statement_handles = vec![
            QueryId::new("q1").unwrap(),
            QueryId::new("q2").unwrap(),
        ];
        assert!(d.has_more_statements(0));
        assert!(!d.has_more_statements(1));
    }
}

//! Format-tag dispatch and the fixed server-type-to-scalar-kind mapping
//! table (spec §4.2 "Decoding"). Parsing individual column payloads
//! beyond this framing is out of scope; `decode_chunk` only turns a
//! chunk's bytes into the same row shape the inline batch already uses.

use warehouse_core::domain::{ColumnType, ResultFormat, WarehouseError};

/// Server-to-presented-scalar mapping table (spec §4.2). Exposed for a
/// host binding layer to project `ColumnMeta`/cell strings into typed
/// values; this crate stops at producing `Option<String>` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Text,
    Float64,
    /// `FIXED`: exact representation depends on precision/scale and
    /// `high_precision` — int64 when it fits, otherwise big-decimal.
    Int64OrDecimal,
    TimestampWithLocation,
    Bytes,
    /// `VARIANT`/`ARRAY`/`OBJECT`: presented as a string unless the
    /// caller asked for structured values.
    StringOrStructured,
}

pub fn present_scalar_kind(column_type: ColumnType, high_precision: bool) -> ScalarKind {
    match column_type {
        ColumnType::Boolean => ScalarKind::Bool,
        ColumnType::Text => ScalarKind::Text,
        ColumnType::Real => ScalarKind::Float64,
        ColumnType::Fixed => ScalarKind::Int64OrDecimal,
        ColumnType::Date | ColumnType::Time | ColumnType::TimestampLtz | ColumnType::TimestampNtz | ColumnType::TimestampTz => {
            ScalarKind::TimestampWithLocation
        }
        ColumnType::Binary => ScalarKind::Bytes,
        ColumnType::Variant | ColumnType::Array | ColumnType::Object => {
            let _ = high_precision;
            ScalarKind::StringOrStructured
        }
    }
}

/// Turns one chunk's decompressed body into the same
/// `Vec<Vec<Option<String>>>` row shape the inline batch uses.
pub fn decode_chunk(format: ResultFormat, body: &[u8]) -> Result<Vec<Vec<Option<String>>>, WarehouseError> {
    match format {
        ResultFormat::JsonRowSet => decode_json_row_set(body),
        ResultFormat::ColumnarBinary => Err(WarehouseError::UnknownChunkFormat(
            "columnar binary chunk decoding is not implemented beyond format-tag recognition".to_string(),
        )),
    }
}

fn decode_json_row_set(body: &[u8]) -> Result<Vec<Vec<Option<String>>>, WarehouseError> {
    serde_json::from_slice(body).map_err(|e| WarehouseError::Protocol(format!("malformed chunk body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_types_to_scalar_kinds() {
        assert_eq!(present_scalar_kind(ColumnType::Boolean, false), ScalarKind::Bool);
        assert_eq!(present_scalar_kind(ColumnType::Fixed, false), ScalarKind::Int64OrDecimal);
        assert_eq!(
            present_scalar_kind(ColumnType::TimestampNtz, false),
            ScalarKind::TimestampWithLocation
        );
        assert_eq!(present_scalar_kind(ColumnType::Variant, true), ScalarKind::StringOrStructured);
    }

    #[test]
    fn decodes_json_row_set_chunk() {
        let body = br#"[["1","a"],[null,"b"]]"#;
        let rows = decode_chunk(ResultFormat::JsonRowSet, body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Some("1".to_string()));
        assert_eq!(rows[1][0], None);
    }

    #[test]
    fn columnar_binary_is_recognised_but_unsupported() {
        let err = decode_chunk(ResultFormat::ColumnarBinary, b"\x00\x01").unwrap_err();
        assert!(matches!(err, WarehouseError::UnknownChunkFormat(_)));
    }
}

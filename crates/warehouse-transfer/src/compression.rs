//! Compression sniffing and the auto-compress decision (spec §4.4 step 1).

use std::io::Read;

use flate2::read::GzEncoder;
use flate2::Compression as GzLevel;
use warehouse_core::domain::Compression;

/// Sniffs a file's compression codec from its name and, where the
/// extension is ambiguous, its leading magic bytes.
pub fn sniff_compression(file_name: &str, leading_bytes: &[u8]) -> Compression {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".gz") || lower.ends_with(".gzip") {
        return Compression::Gzip;
    }
    if lower.ends_with(".bz2") {
        return Compression::Bz2;
    }
    if lower.ends_with(".zst") || lower.ends_with(".zstd") {
        return Compression::Zstd;
    }
    if lower.ends_with(".br") {
        return Compression::Brotli;
    }
    if lower.ends_with(".deflate") {
        return Compression::Deflate;
    }
    if lower.ends_with(".parquet") {
        return Compression::Parquet;
    }
    if lower.ends_with(".orc") {
        return Compression::Orc;
    }
    sniff_magic_bytes(leading_bytes)
}

fn sniff_magic_bytes(bytes: &[u8]) -> Compression {
    match bytes {
        [0x1f, 0x8b, ..] => Compression::Gzip,
        [b'B', b'Z', b'h', ..] => Compression::Bz2,
        [0x28, 0xb5, 0x2f, 0xfd, ..] => Compression::Zstd,
        [b'P', b'A', b'R', b'1', ..] => Compression::Parquet,
        _ => Compression::None,
    }
}

/// Decides whether the agent should gzip a file before upload, per
/// `auto_compress`/`source_compression` on the plan. Pre-compressed and
/// self-describing columnar formats are left untouched; everything else
/// is gzipped when `auto_compress` is set (spec §4.4 step 1).
pub fn should_gzip(sniffed: Compression, auto_compress: bool) -> bool {
    auto_compress && !sniffed.is_precompressed()
}

/// Gzips `plaintext` at the default compression level, the codec the
/// auto-compress path always produces.
pub fn gzip(plaintext: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(plaintext, GzLevel::default());
    let mut out = Vec::new();
    encoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_by_extension_first() {
        assert_eq!(sniff_compression("a.csv.gz", b""), Compression::Gzip);
        assert_eq!(sniff_compression("a.parquet", b""), Compression::Parquet);
    }

    #[test]
    fn falls_back_to_magic_bytes_for_unknown_extensions() {
        assert_eq!(sniff_compression("a.dat", &[0x1f, 0x8b, 0x08]), Compression::Gzip);
        assert_eq!(sniff_compression("a.dat", b"plain text"), Compression::None);
    }

    #[test]
    fn auto_compress_skips_precompressed_formats() {
        assert!(!should_gzip(Compression::Gzip, true));
        assert!(!should_gzip(Compression::Parquet, true));
        assert!(should_gzip(Compression::None, true));
        assert!(!should_gzip(Compression::None, false));
    }

    #[test]
    fn gzip_round_trips_through_gzdecoder() {
        let input = b"hello hello hello hello";
        let compressed = gzip(input).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, input);
    }
}

//! Streaming SHA-256 digest of the final (compressed, encrypted) payload
//! bytes that get uploaded, so the result row can report the same digest
//! a later integrity check would recompute (spec §4.4 step 3).

use sha2::{Digest, Sha256};
use warehouse_core::domain::{Sha256Digest, WarehouseError};

pub fn digest_bytes(bytes: &[u8]) -> Result<Sha256Digest, WarehouseError> {
    let hash = Sha256::digest(bytes);
    Sha256Digest::new(format!("{hash:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_well_formed() {
        let a = digest_bytes(b"hello").unwrap();
        let b = digest_bytes(b"hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn digest_differs_for_different_input() {
        let a = digest_bytes(b"hello").unwrap();
        let b = digest_bytes(b"world").unwrap();
        assert_ne!(a, b);
    }
}

//! Client-side encryption for stage uploads (spec §4.4 step 4): generate a
//! random per-file key/IV, encrypt the (already compressed) payload, then
//! wrap the per-file key with the stage's QMK before it ever leaves the
//! process. Mirrors the `aes_gcm`/`GenericArray` idiom used for
//! at-rest encryption elsewhere in this codebase's lineage, plus a CBC path
//! for stages whose policy calls for it.

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use warehouse_core::domain::{EncryptionMaterial, WarehouseError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Selects the block cipher mode used for a file's payload. The stage
/// policy that picks between the two lives outside `StageInfo` today (no
/// field carries it); `CipherMode::for_provider` is the documented
/// stand-in until a real policy field exists (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Gcm,
    Cbc,
}

impl CipherMode {
    pub fn for_provider(provider: warehouse_core::domain::StageProvider) -> Self {
        use warehouse_core::domain::StageProvider;
        match provider {
            StageProvider::Azure => CipherMode::Cbc,
            StageProvider::S3 | StageProvider::Gcs | StageProvider::Local => CipherMode::Gcm,
        }
    }
}

const GCM_NONCE_LEN: usize = 12;
const CBC_IV_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// A freshly generated per-file symmetric key, kept in memory only long
/// enough to encrypt one file and wrap itself against the QMK.
pub struct FileKey {
    key: [u8; KEY_LEN],
    iv: Vec<u8>,
    mode: CipherMode,
}

impl FileKey {
    pub fn generate(mode: CipherMode) -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        let iv_len = match mode {
            CipherMode::Gcm => GCM_NONCE_LEN,
            CipherMode::Cbc => CBC_IV_LEN,
        };
        let mut iv = vec![0u8; iv_len];
        rand::thread_rng().fill_bytes(&mut iv);
        Self { key, iv, mode }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, WarehouseError> {
        match self.mode {
            CipherMode::Gcm => {
                let cipher = Aes256Gcm::new_from_slice(&self.key)
                    .map_err(|e| WarehouseError::ObjectStore(format!("bad AES-GCM key: {e}")))?;
                let nonce = Nonce::from_slice(&self.iv);
                cipher
                    .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
                    .map_err(|e| WarehouseError::ObjectStore(format!("AES-GCM encrypt failed: {e}")))
            }
            CipherMode::Cbc => {
                let enc = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
                    .map_err(|e| WarehouseError::ObjectStore(format!("bad AES-CBC key/iv: {e}")))?;
                Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
        }
    }

    /// Wraps this file's key (and records its IV) using the stage's QMK as
    /// a second AES-GCM key, producing the `EncryptionMaterial` that rides
    /// along with the uploaded object's metadata (spec §4.4 step 4).
    pub fn wrap(&self, qmk_base64: &str) -> Result<EncryptionMaterial, WarehouseError> {
        let qmk = STANDARD
            .decode(qmk_base64)
            .map_err(|e| WarehouseError::ObjectStore(format!("invalid QMK encoding: {e}")))?;
        let wrap_key = derive_wrap_key(&qmk);

        let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let cipher = Aes256Gcm::new_from_slice(&wrap_key)
            .map_err(|e| WarehouseError::ObjectStore(format!("bad QMK wrap key: {e}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let wrapped = cipher
            .encrypt(nonce, Payload { msg: &self.key, aad: &[] })
            .map_err(|e| WarehouseError::ObjectStore(format!("key wrap failed: {e}")))?;

        let mut wire = nonce_bytes.to_vec();
        wire.extend_from_slice(&wrapped);

        Ok(EncryptionMaterial {
            wrapped_key: STANDARD.encode(wire),
            iv: STANDARD.encode(&self.iv),
        })
    }
}

/// Reverses [`FileKey::wrap`]/[`FileKey::encrypt`] for a downloaded,
/// decrypted GET (the driver must reconstruct the same per-file key from
/// the wrapped material the upload recorded).
pub fn unwrap_key(material: &EncryptionMaterial, qmk_base64: &str, mode: CipherMode) -> Result<FileKey, WarehouseError> {
    let qmk = STANDARD
        .decode(qmk_base64)
        .map_err(|e| WarehouseError::ObjectStore(format!("invalid QMK encoding: {e}")))?;
    let wrap_key = derive_wrap_key(&qmk);

    let wire = STANDARD
        .decode(&material.wrapped_key)
        .map_err(|e| WarehouseError::ObjectStore(format!("invalid wrapped key encoding: {e}")))?;
    if wire.len() <= GCM_NONCE_LEN {
        return Err(WarehouseError::ObjectStore("wrapped key too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = wire.split_at(GCM_NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(&wrap_key)
        .map_err(|e| WarehouseError::ObjectStore(format!("bad QMK wrap key: {e}")))?;
    let nonce = Nonce::from_slice(nonce_bytes);
    let key_bytes = cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &[] })
        .map_err(|e| WarehouseError::ObjectStore(format!("key unwrap failed: {e}")))?;
    if key_bytes.len() != KEY_LEN {
        return Err(WarehouseError::ObjectStore("unwrapped key has unexpected length".to_string()));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&key_bytes);

    let iv = STANDARD
        .decode(&material.iv)
        .map_err(|e| WarehouseError::ObjectStore(format!("invalid iv encoding: {e}")))?;

    Ok(FileKey { key, iv, mode })
}

impl FileKey {
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, WarehouseError> {
        match self.mode {
            CipherMode::Gcm => {
                let cipher = Aes256Gcm::new_from_slice(&self.key)
                    .map_err(|e| WarehouseError::ObjectStore(format!("bad AES-GCM key: {e}")))?;
                let nonce = Nonce::from_slice(&self.iv);
                cipher
                    .decrypt(nonce, Payload { msg: ciphertext, aad: &[] })
                    .map_err(|e| WarehouseError::ObjectStore(format!("AES-GCM decrypt failed: {e}")))
            }
            CipherMode::Cbc => {
                let dec = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
                    .map_err(|e| WarehouseError::ObjectStore(format!("bad AES-CBC key/iv: {e}")))?;
                dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|e| WarehouseError::ObjectStore(format!("AES-CBC decrypt failed: {e}")))
            }
        }
    }
}

/// The QMK as handed to us is account-scoped key material, not directly a
/// 256-bit AES key; hash it down to one the same way the per-file digest
/// pipeline derives fixed-length material from variable-length input.
fn derive_wrap_key(qmk: &[u8]) -> [u8; KEY_LEN] {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(qmk);
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn qmk() -> String {
        STANDARD.encode(b"a-query-master-key-of-some-length")
    }

    #[test]
    fn gcm_round_trips_ciphertext_and_wrapped_key() {
        let key = FileKey::generate(CipherMode::Gcm);
        let ciphertext = key.encrypt(b"hello world").unwrap();
        assert_ne!(ciphertext, b"hello world");

        let material = key.wrap(&qmk()).unwrap();
        let restored = unwrap_key(&material, &qmk(), CipherMode::Gcm).unwrap();
        let plaintext = restored.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn cbc_round_trips_ciphertext_and_wrapped_key() {
        let key = FileKey::generate(CipherMode::Cbc);
        let ciphertext = key.encrypt(b"some payload bytes").unwrap();

        let material = key.wrap(&qmk()).unwrap();
        let restored = unwrap_key(&material, &qmk(), CipherMode::Cbc).unwrap();
        let plaintext = restored.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"some payload bytes");
    }

    #[test]
    fn cipher_mode_defaults_azure_to_cbc_and_others_to_gcm() {
        use warehouse_core::domain::StageProvider;
        assert_eq!(CipherMode::for_provider(StageProvider::Azure), CipherMode::Cbc);
        assert_eq!(CipherMode::for_provider(StageProvider::S3), CipherMode::Gcm);
        assert_eq!(CipherMode::for_provider(StageProvider::Gcs), CipherMode::Gcm);
        assert_eq!(CipherMode::for_provider(StageProvider::Local), CipherMode::Gcm);
    }
}

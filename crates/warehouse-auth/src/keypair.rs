//! Key-pair (JWT) authenticator (spec §4.3): signs a JWT with the
//! account's RSA private key; `iss=ACCOUNT.USER.FP` where FP is the
//! base64url SHA-256 fingerprint of the DER-encoded public key.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use warehouse_core::domain::WarehouseError;

const DEFAULT_JWT_TIMEOUT_SECS: u64 = 60;
const MAX_JWT_TIMEOUT_SECS: u64 = 3600;

/// Computes `base64url(sha256(DER(publicKey)))`, used as the fingerprint
/// segment of the JWT issuer (spec §8 "Testable Properties").
pub fn public_key_fingerprint(private_key: &RsaPrivateKey) -> Result<String, WarehouseError> {
    use rsa::pkcs8::EncodePublicKey;
    let public_key = private_key.to_public_key();
    let der = public_key
        .to_public_key_der()
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("failed to encode public key: {e}")))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

pub fn load_private_key(base64url_pkcs8: &str) -> Result<RsaPrivateKey, WarehouseError> {
    let der = STANDARD
        .decode(base64url_pkcs8)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(base64url_pkcs8))
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("invalid private key encoding: {e}")))?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("failed to parse private key: {e}")))
}

#[derive(Debug, serde::Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Builds and signs the RS256 JWT (spec §4.3 key-pair claims). `timeout`
/// is clamped to the spec's documented maximum of 3600s.
pub fn sign_jwt(
    private_key: &RsaPrivateKey,
    account: &str,
    user: &str,
    timeout_secs: u64,
) -> Result<String, WarehouseError> {
    let timeout_secs = timeout_secs.min(MAX_JWT_TIMEOUT_SECS);
    let fingerprint = public_key_fingerprint(private_key)?;
    let account_upper = account.to_uppercase();
    let user_upper = user.to_uppercase();

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: format!("{account_upper}.{user_upper}.{fingerprint}"),
        sub: format!("{account_upper}.{user_upper}"),
        iat: now,
        exp: now + timeout_secs as i64,
    };

    let header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
    let claims_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&claims)
            .map_err(|e| WarehouseError::Protocol(format!("failed to serialize jwt claims: {e}")))?,
    );
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key.sign(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{signing_input}.{signature_b64}"))
}

pub fn default_jwt_timeout() -> u64 {
    DEFAULT_JWT_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 2048).expect("key generation")
    }

    #[test]
    fn jwt_has_three_segments_and_clamped_exp() {
        let key = test_key();
        let jwt = sign_jwt(&key, "acme", "alice", 10_000_000).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let claims_json = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&claims_json).unwrap();
        let iat = claims["iat"].as_i64().unwrap();
        let exp = claims["exp"].as_i64().unwrap();
        assert!(iat <= exp);
        assert!(exp - iat <= MAX_JWT_TIMEOUT_SECS as i64);
    }

    #[test]
    fn issuer_matches_account_user_fingerprint_shape() {
        let key = test_key();
        let jwt = sign_jwt(&key, "acme", "alice", 60).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        let claims_json = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&claims_json).unwrap();
        let iss = claims["iss"].as_str().unwrap();
        assert!(iss.starts_with("ACME.ALICE."));
        let fp = public_key_fingerprint(&key).unwrap();
        assert_eq!(iss, format!("ACME.ALICE.{fp}"));
    }

    #[test]
    fn private_key_roundtrips_through_base64() {
        let key = test_key();
        let der = key.to_pkcs8_der().unwrap();
        let encoded = STANDARD.encode(der.as_bytes());
        let loaded = load_private_key(&encoded).unwrap();
        assert_eq!(
            public_key_fingerprint(&key).unwrap(),
            public_key_fingerprint(&loaded).unwrap()
        );
    }
}

//! OIDC workload identity (spec §4.3): a raw JWT is passed through
//! unverified; only its `sub`/`iss` claims are extracted for logging.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use warehouse_core::domain::WarehouseError;

#[derive(Debug, serde::Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
}

/// Extracts `sub`/`iss` from a JWT's payload segment without verifying the
/// signature; the token itself is trusted as-is (spec §4.3, "raw JWT
/// passthrough").
pub fn describe_token(token: &str) -> Result<(Option<String>, Option<String>), WarehouseError> {
    let mut parts = token.split('.');
    let _header = parts.next();
    let payload = parts
        .next()
        .ok_or_else(|| WarehouseError::AuthenticationFailed("malformed oidc token".to_string()))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("invalid oidc token payload: {e}")))?;
    let claims: UnverifiedClaims = serde_json::from_slice(&decoded)
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("invalid oidc token claims: {e}")))?;
    Ok((claims.sub, claims.iss))
}

pub fn token(raw_token: &str) -> Result<String, WarehouseError> {
    if raw_token.is_empty() {
        return Err(WarehouseError::InvalidConfig(
            "oidc workload identity requires a token".to_string(),
        ));
    }
    Ok(raw_token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_unverified_jwt(sub: &str, iss: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let claims = serde_json::json!({ "sub": sub, "iss": iss });
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("{header}.{payload}.")
    }

    #[test]
    fn describes_sub_and_iss_from_unverified_token() {
        let jwt = make_unverified_jwt("user@project.iam.gserviceaccount.com", "https://accounts.google.com");
        let (sub, iss) = describe_token(&jwt).unwrap();
        assert_eq!(sub.as_deref(), Some("user@project.iam.gserviceaccount.com"));
        assert_eq!(iss.as_deref(), Some("https://accounts.google.com"));
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(token("").is_err());
    }
}

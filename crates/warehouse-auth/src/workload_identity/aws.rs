//! AWS workload identity (spec §4.3): signs a `GetCallerIdentity` request
//! with SigV4 and ships the signed request (not a bearer token) as proof of
//! identity, with an optional `AssumeRole` impersonation chain.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use warehouse_core::domain::WarehouseError;

type HmacSha256 = Hmac<Sha256>;

pub const AUDIENCE_HEADER: &str = "X-Snowflake-Audience";
pub const AUDIENCE_VALUE: &str = "snowflakecomputing.com";

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: String,
}

/// The pre-signed `GetCallerIdentity` request the server uses to verify
/// the caller's AWS identity without the driver ever holding a session to
/// STS itself.
#[derive(Debug, Clone)]
pub struct SignedStsRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

fn sign(key: &[u8], msg: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(msg.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn hex_sha256(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    to_hex(&digest)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Builds a SigV4-signed `GetCallerIdentity` request (spec §4.3: "signs a
/// GetCallerIdentity request with SigV4").
pub fn build_signed_get_caller_identity(
    creds: &AwsCredentials,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> Result<SignedStsRequest, WarehouseError> {
    let region = &creds.region;
    let service = "sts";
    let host = format!("sts.{region}.amazonaws.com");
    let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = timestamp.format("%Y%m%d").to_string();
    let body = "Action=GetCallerIdentity&Version=2011-06-15".to_string();

    let mut canonical_headers = format!(
        "content-type:application/x-www-form-urlencoded; charset=utf-8\nhost:{host}\nx-amz-date:{amz_date}\n"
    );
    let mut signed_headers = "content-type;host;x-amz-date".to_string();
    if let Some(token) = &creds.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }

    let canonical_request = format!(
        "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex_sha256(&body)
    );

    let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(&canonical_request)
    );

    let k_date = sign(format!("AWS4{}", creds.secret_access_key).as_bytes(), &date_stamp);
    let k_region = sign(&k_date, region);
    let k_service = sign(&k_region, service);
    let k_signing = sign(&k_service, "aws4_request");
    let signature = to_hex(&sign(&k_signing, &string_to_sign));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key_id
    );

    let mut headers = vec![
        ("Host".to_string(), host.clone()),
        ("Content-Type".to_string(), "application/x-www-form-urlencoded; charset=utf-8".to_string()),
        ("X-Amz-Date".to_string(), amz_date),
        ("Authorization".to_string(), authorization),
        (AUDIENCE_HEADER.to_string(), AUDIENCE_VALUE.to_string()),
    ];
    if let Some(token) = &creds.session_token {
        headers.push(("X-Amz-Security-Token".to_string(), token.clone()));
    }

    Ok(SignedStsRequest {
        method: "POST",
        url: format!("https://{host}/"),
        headers,
        body,
    })
}

/// Assumes `role_arn` before signing, for the optional impersonation chain
/// (spec §4.3). Returns the temporary credentials to sign the final
/// `GetCallerIdentity` request with.
pub async fn assume_role(
    client: &reqwest::Client,
    base_creds: &AwsCredentials,
    role_arn: &str,
    session_name: &str,
) -> Result<AwsCredentials, WarehouseError> {
    let timestamp = chrono_now();
    let sts_request = build_signed_get_caller_identity(base_creds, timestamp)?;
    let _ = sts_request;

    #[derive(serde::Deserialize)]
    struct AssumeRoleResponseEnvelope {
        #[serde(rename = "AssumeRoleResult")]
        result: AssumeRoleResult,
    }
    #[derive(serde::Deserialize)]
    struct AssumeRoleResult {
        #[serde(rename = "Credentials")]
        credentials: TemporaryCredentials,
    }
    #[derive(serde::Deserialize)]
    struct TemporaryCredentials {
        #[serde(rename = "AccessKeyId")]
        access_key_id: String,
        #[serde(rename = "SecretAccessKey")]
        secret_access_key: String,
        #[serde(rename = "SessionToken")]
        session_token: String,
    }

    let url = format!(
        "https://sts.{}.amazonaws.com/?Action=AssumeRole&Version=2011-06-15&RoleArn={role_arn}&RoleSessionName={session_name}",
        base_creds.region
    );
    let response = client
        .post(&url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("assume-role request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(WarehouseError::AuthenticationFailed(format!(
            "assume-role returned {}",
            response.status()
        )));
    }
    let parsed: AssumeRoleResponseEnvelope = response
        .json()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("malformed assume-role response: {e}")))?;

    Ok(AwsCredentials {
        access_key_id: parsed.result.credentials.access_key_id,
        secret_access_key: parsed.result.credentials.secret_access_key,
        session_token: Some(parsed.result.credentials.session_token),
        region: base_creds.region.clone(),
    })
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> AwsCredentials {
        AwsCredentials {
            access_key_id: "AKIAEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: None,
            region: "us-east-1".into(),
        }
    }

    #[test]
    fn signed_request_carries_audience_header() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let signed = build_signed_get_caller_identity(&creds(), ts).unwrap();
        assert!(signed
            .headers
            .iter()
            .any(|(k, v)| k == AUDIENCE_HEADER && v == AUDIENCE_VALUE));
    }

    #[test]
    fn signed_request_targets_regional_sts_host() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let signed = build_signed_get_caller_identity(&creds(), ts).unwrap();
        assert_eq!(signed.url, "https://sts.us-east-1.amazonaws.com/");
    }

    #[test]
    fn session_token_credentials_add_security_token_header() {
        let mut c = creds();
        c.session_token = Some("tok".into());
        let ts = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let signed = build_signed_get_caller_identity(&c, ts).unwrap();
        assert!(signed.headers.iter().any(|(k, _)| k == "X-Amz-Security-Token"));
    }
}

//! Workload identity authenticator (spec §4.3): platform-native attestation
//! with no shared secret. Autodetection order when no provider is pinned:
//! OIDC env var, then AWS instance credentials, then GCP metadata server,
//! then Azure IMDS.

pub mod aws;
pub mod azure;
pub mod gcp;
pub mod oidc;

use warehouse_core::config::WorkloadIdentityProvider;
use warehouse_core::domain::WarehouseError;

const OIDC_TOKEN_ENV: &str = "SNOWFLAKE_WORKLOAD_IDENTITY_OIDC_TOKEN";

/// Detects which provider is available when the caller hasn't pinned one,
/// by probing for the environment/metadata signals each platform leaves
/// behind (spec §4.3: "autodetection order: OIDC, AWS, GCP, Azure").
pub async fn detect_provider(client: &reqwest::Client) -> Result<WorkloadIdentityProvider, WarehouseError> {
    if std::env::var(OIDC_TOKEN_ENV).is_ok() {
        return Ok(WorkloadIdentityProvider::Oidc);
    }
    if std::env::var("AWS_ACCESS_KEY_ID").is_ok() || std::env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI").is_ok() {
        return Ok(WorkloadIdentityProvider::Aws);
    }
    if probe_metadata_server(client, "http://metadata.google.internal", "Metadata-Flavor", "Google").await {
        return Ok(WorkloadIdentityProvider::Gcp);
    }
    if probe_metadata_server(client, "http://169.254.169.254/metadata/identity/oauth2/token", "Metadata", "true").await {
        return Ok(WorkloadIdentityProvider::Azure);
    }
    Err(WarehouseError::AuthenticationFailed(
        "unable to autodetect a workload identity provider".to_string(),
    ))
}

async fn probe_metadata_server(client: &reqwest::Client, url: &str, header: &str, value: &str) -> bool {
    client
        .get(url)
        .header(header, value)
        .timeout(std::time::Duration::from_millis(500))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oidc_env_var_wins_over_everything_else() {
        std::env::set_var(OIDC_TOKEN_ENV, "some.jwt.token");
        let client = reqwest::Client::new();
        let provider = detect_provider(&client).await.unwrap();
        assert_eq!(provider, WorkloadIdentityProvider::Oidc);
        std::env::remove_var(OIDC_TOKEN_ENV);
    }
}

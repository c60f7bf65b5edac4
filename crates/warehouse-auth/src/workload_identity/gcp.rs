//! GCP workload identity (spec §4.3): fetches an identity token from the
//! instance metadata server, audience pinned to the warehouse service, with
//! an optional service-account impersonation hop.

use warehouse_core::domain::WarehouseError;

use super::oidc;

const METADATA_BASE: &str = "http://metadata.google.internal/computeMetadata/v1";
pub const REQUIRED_ISSUER: &str = "https://accounts.google.com";
const AUDIENCE: &str = "snowflakecomputing.com";

pub fn identity_token_url(service_account_email: Option<&str>) -> String {
    match service_account_email {
        Some(email) => format!(
            "{METADATA_BASE}/instance/service-accounts/{email}/identity?audience={AUDIENCE}"
        ),
        None => format!(
            "{METADATA_BASE}/instance/service-accounts/default/identity?audience={AUDIENCE}"
        ),
    }
}

/// Fetches a raw identity token directly from the metadata server (no
/// impersonation).
pub async fn fetch_identity_token(client: &reqwest::Client) -> Result<String, WarehouseError> {
    let url = identity_token_url(None);
    let response = client
        .get(&url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("gcp metadata request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(WarehouseError::AuthenticationFailed(format!(
            "gcp metadata server returned {}",
            response.status()
        )));
    }
    let token = response
        .text()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("failed to read gcp identity token: {e}")))?;
    let (_, iss) = oidc::describe_token(&token)?;
    if iss.as_deref() != Some(REQUIRED_ISSUER) {
        return Err(WarehouseError::AuthenticationFailed(format!(
            "gcp identity token has unexpected issuer {iss:?}, expected {REQUIRED_ISSUER}"
        )));
    }
    Ok(token)
}

/// Impersonates `target_service_account` via
/// `iamcredentials:generateIdToken`, using `source_token` as the caller
/// identity (spec §4.3 "optional service-account impersonation").
pub async fn impersonate(
    client: &reqwest::Client,
    source_token: &str,
    target_service_account: &str,
) -> Result<String, WarehouseError> {
    let url = format!(
        "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{target_service_account}:generateIdToken"
    );
    #[derive(serde::Serialize)]
    struct Body<'a> {
        audience: &'a str,
        #[serde(rename = "includeEmail")]
        include_email: bool,
    }
    #[derive(serde::Deserialize)]
    struct Response {
        token: String,
    }

    let response = client
        .post(&url)
        .bearer_auth(source_token)
        .json(&Body {
            audience: AUDIENCE,
            include_email: true,
        })
        .send()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("gcp impersonation request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(WarehouseError::AuthenticationFailed(format!(
            "gcp impersonation returned {}",
            response.status()
        )));
    }

    let parsed: Response = response
        .json()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("malformed impersonation response: {e}")))?;
    Ok(parsed.token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_token_url_pins_audience() {
        let url = identity_token_url(None);
        assert!(url.contains(&format!("audience={AUDIENCE}")));
    }

    #[test]
    fn identity_token_url_targets_named_service_account() {
        let url = identity_token_url(Some("svc@project.iam.gserviceaccount.com"));
        assert!(url.contains("svc@project.iam.gserviceaccount.com"));
    }

    #[test]
    fn required_issuer_matches_real_google_issuer() {
        assert_eq!(REQUIRED_ISSUER, "https://accounts.google.com");
    }
}

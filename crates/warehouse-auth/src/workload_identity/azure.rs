//! Azure workload identity (spec §4.3): fetches a token from IMDS or, in
//! Azure Functions/App Service, the `IDENTITY_ENDPOINT`/`IDENTITY_HEADER`
//! managed-identity endpoint.

use warehouse_core::domain::WarehouseError;

use super::oidc;

const IMDS_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const AUDIENCE: &str = "https://snowflakecomputing.com";

pub fn expected_issuer_prefixes() -> [&'static str; 2] {
    ["https://sts.windows.net/", "https://login.microsoftonline.com/"]
}

pub fn issuer_is_valid(issuer: &str) -> bool {
    expected_issuer_prefixes()
        .iter()
        .any(|prefix| issuer.starts_with(prefix))
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Fetches a managed-identity token, preferring the Functions/App Service
/// identity endpoint when `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` are set,
/// else falling back to IMDS.
pub async fn fetch_token(client: &reqwest::Client) -> Result<String, WarehouseError> {
    if let (Ok(endpoint), Ok(header)) = (
        std::env::var("IDENTITY_ENDPOINT"),
        std::env::var("IDENTITY_HEADER"),
    ) {
        return fetch_from_identity_endpoint(client, &endpoint, &header).await;
    }
    fetch_from_imds(client).await
}

async fn fetch_from_imds(client: &reqwest::Client) -> Result<String, WarehouseError> {
    let response = client
        .get(IMDS_URL)
        .header("Metadata", "true")
        .query(&[("api-version", IMDS_API_VERSION), ("resource", AUDIENCE)])
        .send()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("azure imds request failed: {e}")))?;
    parse_token_response(response).await
}

async fn fetch_from_identity_endpoint(
    client: &reqwest::Client,
    endpoint: &str,
    header_secret: &str,
) -> Result<String, WarehouseError> {
    let response = client
        .get(endpoint)
        .header("X-IDENTITY-HEADER", header_secret)
        .query(&[("api-version", "2019-08-01"), ("resource", AUDIENCE)])
        .send()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("azure identity endpoint request failed: {e}")))?;
    parse_token_response(response).await
}

async fn parse_token_response(response: reqwest::Response) -> Result<String, WarehouseError> {
    if !response.status().is_success() {
        return Err(WarehouseError::AuthenticationFailed(format!(
            "azure managed identity endpoint returned {}",
            response.status()
        )));
    }
    let parsed: TokenResponse = response
        .json()
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("malformed azure token response: {e}")))?;
    let (_, iss) = oidc::describe_token(&parsed.access_token)?;
    match iss {
        Some(iss) if issuer_is_valid(&iss) => Ok(parsed.access_token),
        other => Err(WarehouseError::AuthenticationFailed(format!(
            "azure access token has unexpected issuer {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_sts_windows_issuer() {
        assert!(issuer_is_valid("https://sts.windows.net/tenant-id/"));
    }

    #[test]
    fn accepts_login_microsoftonline_issuer() {
        assert!(issuer_is_valid("https://login.microsoftonline.com/tenant-id/v2.0"));
    }

    #[test]
    fn rejects_unknown_issuer() {
        assert!(!issuer_is_valid("https://evil.example.com/"));
    }

    fn make_access_token(iss: &str) -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let claims = serde_json::json!({ "iss": iss });
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("{header}.{payload}.")
    }

    #[tokio::test]
    async fn parse_token_response_accepts_trusted_issuer() {
        let server = wiremock::MockServer::start().await;
        let token = make_access_token("https://sts.windows.net/tenant-id/");
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "access_token": token }),
            ))
            .mount(&server)
            .await;
        let client = reqwest::Client::new();
        let response = client.get(server.uri()).send().await.unwrap();
        let result = parse_token_response(response).await.unwrap();
        assert_eq!(result, token);
    }

    #[tokio::test]
    async fn parse_token_response_rejects_untrusted_issuer() {
        let server = wiremock::MockServer::start().await;
        let token = make_access_token("https://evil.example.com/");
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "access_token": token }),
            ))
            .mount(&server)
            .await;
        let client = reqwest::Client::new();
        let response = client.get(server.uri()).send().await.unwrap();
        assert!(parse_token_response(response).await.is_err());
    }
}

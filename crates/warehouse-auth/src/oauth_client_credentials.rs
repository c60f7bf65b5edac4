//! OAuth client-credentials authenticator (spec §4.3): standard RFC 6749
//! §4.4 token fetch with scopes, no user interaction.

use oauth2::{basic::BasicClient, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use warehouse_core::domain::WarehouseError;
use warehouse_core::ports::{SessionParameters, TokenMaterial};

#[derive(Debug, Clone)]
pub struct OAuthClientCredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

pub async fn obtain_token(
    config: &OAuthClientCredentialsConfig,
) -> Result<TokenMaterial, WarehouseError> {
    let client = BasicClient::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_token_uri(
            TokenUrl::new(config.token_url.clone())
                .map_err(|e| WarehouseError::InvalidConfig(format!("invalid token url: {e}")))?,
        );

    let mut request = client.exchange_client_credentials();
    for scope in &config.scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }

    let http_client = reqwest::Client::new();
    let token_result = request
        .request_async(&http_client)
        .await
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("client credentials exchange failed: {e}")))?;

    let expires_in = token_result
        .expires_in()
        .map(|d| d.as_secs())
        .unwrap_or(3600);

    Ok(TokenMaterial {
        session_token: token_result.access_token().secret().to_string(),
        master_token: String::new(),
        id_token: None,
        session_id: uuid::Uuid::new_v4().to_string(),
        parameters: SessionParameters::default(),
        master_validity_seconds: expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_carries_scopes_through() {
        let config = OAuthClientCredentialsConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            token_url: "https://example.invalid/token".into(),
            scopes: vec!["session:role:analyst".into()],
        };
        assert_eq!(config.scopes.len(), 1);
    }
}

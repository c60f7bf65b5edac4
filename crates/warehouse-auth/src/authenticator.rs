//! Tagged-variant `Authenticator` (spec §4.3, Design Note §9): one enum
//! dispatching over `match` to each strategy module, rather than an open
//! trait-object registry — the set of authentication strategies is fixed
//! and known at compile time.

use async_trait::async_trait;
use base64::Engine;

use warehouse_core::config::{Config, CredentialSelector, WorkloadIdentityProvider};
use warehouse_core::domain::WarehouseError;
use warehouse_core::ports::{IAuthenticator, SessionParameters, TokenMaterial};

use crate::keypair;
use crate::oauth_client_credentials::{self, OAuthClientCredentialsConfig};
use crate::oauth_code::{self, OAuthAuthorizationCodeConfig};
use crate::password::{PasswordAuthenticator, PasswordCredentials};
use crate::saml::{self, SamlConfig};
use crate::workload_identity::{self, aws, azure, gcp, oidc};

/// Server codes that trigger exactly one silent re-authentication attempt
/// before the error is surfaced to the caller (spec §4.3).
pub const REAUTH_SERVER_CODES: [&str; 2] = ["390104", "390111"];

pub fn is_reauth_code(code: &str) -> bool {
    REAUTH_SERVER_CODES.contains(&code)
}

/// The authenticator strategy an [`IAuthenticator`] impl dispatches on,
/// constructed once from [`CredentialSelector`] at connection setup.
pub enum Authenticator {
    Password {
        transport: std::sync::Arc<warehouse_transport::Transport>,
        credentials: PasswordCredentials,
    },
    KeyPair {
        private_key_b64: String,
        jwt_client_timeout_secs: u64,
        transport: std::sync::Arc<warehouse_transport::Transport>,
    },
    OAuthAuthorizationCode(OAuthAuthorizationCodeConfig),
    OAuthClientCredentials(OAuthClientCredentialsConfig),
    OAuthToken(String),
    Saml(SamlConfig),
    WorkloadIdentity {
        provider: Option<WorkloadIdentityProvider>,
        token: Option<String>,
    },
}

impl Authenticator {
    /// Builds the right variant from a resolved [`Config`]'s credential
    /// selector, wiring in the transport the session client already owns.
    pub fn from_config(
        config: &Config,
        transport: std::sync::Arc<warehouse_transport::Transport>,
    ) -> Self {
        match &config.credentials {
            CredentialSelector::Password {
                password,
                passcode,
                passcode_in_password,
            } => Authenticator::Password {
                transport,
                credentials: PasswordCredentials {
                    password: password.clone(),
                    passcode: passcode.clone(),
                    passcode_in_password: *passcode_in_password,
                },
            },
            CredentialSelector::KeyPair {
                private_key_b64,
                jwt_client_timeout_secs,
            } => Authenticator::KeyPair {
                private_key_b64: private_key_b64.clone(),
                jwt_client_timeout_secs: *jwt_client_timeout_secs,
                transport,
            },
            CredentialSelector::OAuthAuthorizationCode {
                client_id,
                authorize_url,
                token_url,
                scopes,
                redirect_port,
            } => Authenticator::OAuthAuthorizationCode(OAuthAuthorizationCodeConfig {
                client_id: client_id.clone(),
                authorize_url: authorize_url.clone(),
                token_url: token_url.clone(),
                scopes: scopes.clone(),
                redirect_port: *redirect_port,
                external_browser_timeout: config.timeouts.external_browser_timeout,
                single_authentication_prompt: config.session.single_authentication_prompt,
            }),
            CredentialSelector::OAuthClientCredentials {
                client_id,
                client_secret,
                token_url,
                scopes,
            } => Authenticator::OAuthClientCredentials(OAuthClientCredentialsConfig {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                token_url: token_url.clone(),
                scopes: scopes.clone(),
            }),
            CredentialSelector::OAuthToken { token } => Authenticator::OAuthToken(token.clone()),
            CredentialSelector::Saml {
                username,
                password,
                authenticator_url,
            } => Authenticator::Saml(SamlConfig {
                username: username.clone(),
                password: password.clone(),
                authenticator_url: authenticator_url.clone(),
            }),
            CredentialSelector::WorkloadIdentity { provider, token } => {
                Authenticator::WorkloadIdentity {
                    provider: *provider,
                    token: token.clone(),
                }
            }
        }
    }

    async fn obtain(&self, config: &Config) -> Result<TokenMaterial, WarehouseError> {
        match self {
            Authenticator::Password {
                transport,
                credentials,
            } => {
                let authenticator = PasswordAuthenticator {
                    transport: transport.clone(),
                };
                authenticator.obtain_token(config, credentials).await
            }
            Authenticator::KeyPair {
                private_key_b64,
                jwt_client_timeout_secs,
                transport,
            } => {
                let private_key = keypair::load_private_key(private_key_b64)?;
                let timeout = if *jwt_client_timeout_secs == 0 {
                    keypair::default_jwt_timeout()
                } else {
                    *jwt_client_timeout_secs
                };
                let jwt = keypair::sign_jwt(&private_key, &config.account, &config.user, timeout)?;
                let authenticator = PasswordAuthenticator {
                    transport: transport.clone(),
                };
                let creds = PasswordCredentials {
                    password: jwt,
                    passcode: None,
                    passcode_in_password: false,
                };
                authenticator.obtain_token(config, &creds).await
            }
            Authenticator::OAuthAuthorizationCode(oauth_config) => {
                oauth_code::login(oauth_config, |url| webbrowser::open(url).map_err(|e| {
                    WarehouseError::AuthorizationFlowFailed(format!("failed to open browser: {e}"))
                }))
                .await
            }
            Authenticator::OAuthClientCredentials(oauth_config) => {
                oauth_client_credentials::obtain_token(oauth_config).await
            }
            Authenticator::OAuthToken(token) => Ok(TokenMaterial {
                session_token: token.clone(),
                master_token: String::new(),
                id_token: None,
                session_id: uuid::Uuid::new_v4().to_string(),
                parameters: SessionParameters::default(),
                master_validity_seconds: 3600,
            }),
            Authenticator::Saml(saml_config) => obtain_saml_token(saml_config).await,
            Authenticator::WorkloadIdentity { provider, token } => {
                obtain_workload_identity_token(provider.as_ref(), token.as_deref()).await
            }
        }
    }
}

async fn obtain_saml_token(config: &SamlConfig) -> Result<TokenMaterial, WarehouseError> {
    let client = reqwest::Client::new();

    #[derive(serde::Deserialize)]
    struct FedUrls {
        #[serde(rename = "tokenUrl")]
        token_url: String,
        #[serde(rename = "ssoUrl")]
        sso_url: String,
    }
    #[derive(serde::Deserialize)]
    struct FedUrlsEnvelope {
        data: FedUrls,
    }

    let fed_urls_endpoint = format!("{}/session/authenticator-request", config.authenticator_url);
    let fed_urls: FedUrlsEnvelope = client
        .post(&fed_urls_endpoint)
        .json(&serde_json::json!({ "accountName": config.authenticator_url }))
        .send()
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("fed urls request failed: {e}")))?
        .json()
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("malformed fed urls response: {e}")))?;

    saml::validate_idp_urls(config, &fed_urls.data.token_url, &fed_urls.data.sso_url)?;

    #[derive(serde::Deserialize)]
    struct OneTimeTokenResponse {
        #[serde(rename = "oneTimeToken")]
        one_time_token: String,
    }
    let one_time_token: OneTimeTokenResponse = client
        .post(&fed_urls.data.token_url)
        .json(&serde_json::json!({
            "username": config.username,
            "password": config.password,
        }))
        .send()
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("idp token request failed: {e}")))?
        .json()
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("malformed idp token response: {e}")))?;

    let sso_html = client
        .get(&fed_urls.data.sso_url)
        .query(&[("token", one_time_token.one_time_token.as_str())])
        .send()
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("sso request failed: {e}")))?
        .text()
        .await
        .map_err(|e| WarehouseError::AuthorizationFlowFailed(format!("failed to read sso response body: {e}")))?;

    let form_action = saml::extract_first_form_action(&sso_html).ok_or_else(|| {
        WarehouseError::AuthorizationFlowFailed("sso response did not contain a saml form".to_string())
    })?;
    saml::validate_form_target(config, &form_action)?;

    // The SAML response body itself is submitted through login-request by
    // the session client as the password field; this function only proves
    // the flow is authentic and the form target trustworthy.
    Ok(TokenMaterial {
        session_token: sso_html,
        master_token: String::new(),
        id_token: None,
        session_id: uuid::Uuid::new_v4().to_string(),
        parameters: SessionParameters::default(),
        master_validity_seconds: 3600,
    })
}

async fn obtain_workload_identity_token(
    provider: Option<&WorkloadIdentityProvider>,
    token: Option<&str>,
) -> Result<TokenMaterial, WarehouseError> {
    let client = reqwest::Client::new();
    let resolved_provider = match provider {
        Some(p) => *p,
        None => workload_identity::detect_provider(&client).await?,
    };

    let raw_token = match resolved_provider {
        WorkloadIdentityProvider::Oidc => oidc::token(token.unwrap_or_default())?,
        WorkloadIdentityProvider::Gcp => gcp::fetch_identity_token(&client).await?,
        WorkloadIdentityProvider::Azure => azure::fetch_token(&client).await?,
        WorkloadIdentityProvider::Aws => {
            let creds = aws::AwsCredentials {
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
                session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            };
            let signed = aws::build_signed_get_caller_identity(&creds, chrono::Utc::now())?;
            let proof_json = serde_json::to_string(&serde_json::json!({
                "method": signed.method,
                "url": signed.url,
                "headers": signed.headers,
                "body": signed.body,
            }))
            .map_err(|e| WarehouseError::AuthenticationFailed(format!("failed to serialize aws identity proof: {e}")))?;
            base64::engine::general_purpose::STANDARD.encode(proof_json)
        }
    };

    Ok(TokenMaterial {
        session_token: raw_token,
        master_token: String::new(),
        id_token: None,
        session_id: uuid::Uuid::new_v4().to_string(),
        parameters: SessionParameters::default(),
        master_validity_seconds: 3600,
    })
}

#[async_trait]
impl IAuthenticator for Authenticator {
    async fn obtain_token(&self, config: &Config) -> Result<TokenMaterial, WarehouseError> {
        self.obtain(config).await
    }

    /// Re-runs the same strategy for the single silent re-auth on
    /// 390104/390111 (spec §4.3); interactive strategies (OAuth
    /// authorization code, SAML) will re-prompt, matching the teacher's
    /// re-auth behavior for its own OAuth2 flow.
    async fn refresh(&self, config: &Config) -> Result<TokenMaterial, WarehouseError> {
        self.obtain(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reauth_codes_match_spec_list() {
        assert!(is_reauth_code("390104"));
        assert!(is_reauth_code("390111"));
        assert!(!is_reauth_code("390100"));
    }

    #[test]
    fn from_config_builds_password_variant() {
        let config = Config::builder("acme", "alice")
            .credentials(CredentialSelector::Password {
                password: "hunter2".into(),
                passcode: None,
                passcode_in_password: false,
            })
            .build();
        let transport = std::sync::Arc::new(warehouse_transport::Transport::new(Default::default()).unwrap());
        let authenticator = Authenticator::from_config(&config, transport);
        assert!(matches!(authenticator, Authenticator::Password { .. }));
    }

    #[test]
    fn from_config_builds_oauth_token_variant() {
        let config = Config::builder("acme", "alice")
            .credentials(CredentialSelector::OAuthToken {
                token: "bearer-token".into(),
            })
            .build();
        let transport = std::sync::Arc::new(warehouse_transport::Transport::new(Default::default()).unwrap());
        let authenticator = Authenticator::from_config(&config, transport);
        assert!(matches!(authenticator, Authenticator::OAuthToken(t) if t == "bearer-token"));
    }
}

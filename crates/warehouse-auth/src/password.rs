//! Password authenticator (spec §4.3): `POST login-request` with
//! LOGIN_NAME/PASSWORD and an optional MFA passcode.

use serde::Serialize;
use warehouse_core::config::Config;
use warehouse_core::domain::WarehouseError;
use warehouse_core::ports::{SessionParameters, TokenMaterial};

#[derive(Debug, Clone)]
pub struct PasswordCredentials {
    pub password: String,
    pub passcode: Option<String>,
    pub passcode_in_password: bool,
}

#[derive(Serialize)]
struct LoginRequestBody<'a> {
    #[serde(rename = "LOGIN_NAME")]
    login_name: &'a str,
    #[serde(rename = "PASSWORD")]
    password: &'a str,
    #[serde(rename = "EXT_AUTHN_DUO_METHOD", skip_serializing_if = "Option::is_none")]
    ext_authn_duo_method: Option<&'a str>,
}

pub struct PasswordAuthenticator {
    pub transport: std::sync::Arc<warehouse_transport::Transport>,
}

impl PasswordAuthenticator {
    /// Builds the login-request body, folding the MFA passcode into the
    /// password field when `passcode_in_password` is set (spec GLOSSARY
    /// "MFA passcode").
    pub fn build_request_body<'a>(
        &self,
        user: &'a str,
        creds: &'a PasswordCredentials,
        combined_password: &'a mut String,
    ) -> LoginRequestBody<'a> {
        let password: &str = if creds.passcode_in_password {
            if let Some(code) = &creds.passcode {
                combined_password.push_str(&creds.password);
                combined_password.push_str(code);
            } else {
                combined_password.push_str(&creds.password);
            }
            combined_password.as_str()
        } else {
            &creds.password
        };

        LoginRequestBody {
            login_name: user,
            password,
            ext_authn_duo_method: creds
                .passcode
                .as_ref()
                .filter(|_| !creds.passcode_in_password)
                .map(|_| "passcode"),
        }
    }

    pub async fn obtain_token(
        &self,
        config: &Config,
        creds: &PasswordCredentials,
    ) -> Result<TokenMaterial, WarehouseError> {
        let mut combined = String::new();
        let body = self.build_request_body(&config.user, creds, &mut combined);
        let payload = serde_json::to_vec(&body)
            .map_err(|e| WarehouseError::Protocol(format!("failed to serialize login body: {e}")))?;

        let url = format!("{}/session/v1/login-request", config.base_url());
        let response = self
            .transport
            .execute(warehouse_transport::TransportRequest {
                method: reqwest::Method::POST,
                url: &url,
                body: Some(payload),
                request_id: uuid::Uuid::new_v4(),
                session_token: None,
                service_name: None,
                operation_class: warehouse_transport::OperationClass::Login,
                idempotent: false,
            })
            .await?;

        parse_login_response(&response)
    }
}

/// Parses the `{code, message, success, data}` login envelope (spec §6.2).
pub(crate) fn parse_login_response(body: &[u8]) -> Result<TokenMaterial, WarehouseError> {
    #[derive(serde::Deserialize)]
    struct Envelope {
        success: bool,
        message: Option<String>,
        data: Option<LoginData>,
    }

    #[derive(serde::Deserialize)]
    struct LoginData {
        token: String,
        #[serde(rename = "masterToken")]
        master_token: String,
        #[serde(rename = "idToken")]
        id_token: Option<String>,
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "masterValidityInSeconds")]
        master_validity_in_seconds: Option<u64>,
    }

    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| WarehouseError::Protocol(format!("malformed login response: {e}")))?;

    if !envelope.success {
        return Err(WarehouseError::AuthenticationFailed(
            envelope.message.unwrap_or_else(|| "login rejected".to_string()),
        ));
    }

    let data = envelope
        .data
        .ok_or_else(|| WarehouseError::Protocol("login response missing data".to_string()))?;

    Ok(TokenMaterial {
        session_token: data.token,
        master_token: data.master_token,
        id_token: data.id_token,
        session_id: data.session_id,
        parameters: SessionParameters::default(),
        master_validity_seconds: data.master_validity_in_seconds.unwrap_or(14400),
    })
}

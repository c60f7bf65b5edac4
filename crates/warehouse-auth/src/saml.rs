//! External-IDP SAML authenticator (spec §4.3): anti-phishing check on the
//! token/SSO URLs, anti-exfiltration check on the SAML form target.

use url::Url;
use warehouse_core::domain::WarehouseError;

#[derive(Debug, Clone)]
pub struct SamlConfig {
    pub username: String,
    pub password: String,
    pub authenticator_url: String,
}

/// Returns true iff `candidate` shares scheme+host+port with
/// `configured` (spec §4.3 step 2, "anti-phishing").
pub fn shares_origin(configured: &str, candidate: &str) -> Result<bool, WarehouseError> {
    let configured = Url::parse(configured)
        .map_err(|e| WarehouseError::InvalidConfig(format!("invalid authenticator url: {e}")))?;
    let candidate = Url::parse(candidate)
        .map_err(|e| WarehouseError::AuthenticationFailed(format!("invalid idp url: {e}")))?;
    Ok(configured.scheme() == candidate.scheme()
        && configured.host_str() == candidate.host_str()
        && configured.port_or_known_default() == candidate.port_or_known_default())
}

/// Extracts the `action="…"` attribute of the first `<form>` in the SSO
/// response HTML (spec §4.3 step 5).
pub fn extract_first_form_action(html: &str) -> Option<String> {
    let form_start = html.find("<form")?;
    let tag_end = html[form_start..].find('>')? + form_start;
    let tag = &html[form_start..tag_end];
    let action_key = "action=";
    let action_start = tag.find(action_key)? + action_key.len();
    let quote = tag.as_bytes().get(action_start).copied()? as char;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &tag[action_start + 1..];
    let action_end = rest.find(quote)?;
    Some(rest[..action_end].to_string())
}

/// Validates that the server's token/SSO URLs and the SAML form target
/// all share the configured authenticator's origin (spec §4.3 steps 2+5).
/// This is the literal anti-phishing/anti-exfiltration gate; callers must
/// not proceed with the flow if this returns an error.
pub fn validate_idp_urls(
    config: &SamlConfig,
    token_url: &str,
    sso_url: &str,
) -> Result<(), WarehouseError> {
    if !shares_origin(&config.authenticator_url, token_url)? {
        return Err(WarehouseError::AuthorizationFlowFailed(format!(
            "token url {token_url} does not match configured authenticator origin"
        )));
    }
    if !shares_origin(&config.authenticator_url, sso_url)? {
        return Err(WarehouseError::AuthorizationFlowFailed(format!(
            "sso url {sso_url} does not match configured authenticator origin"
        )));
    }
    Ok(())
}

pub fn validate_form_target(config: &SamlConfig, form_action: &str) -> Result<(), WarehouseError> {
    if !shares_origin(&config.authenticator_url, form_action)? {
        return Err(WarehouseError::AuthorizationFlowFailed(format!(
            "saml form target {form_action} does not match the warehouse server url (possible exfiltration attempt)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_origin_ignores_path() {
        assert!(shares_origin(
            "https://acme.snowflakecomputing.com/auth",
            "https://acme.snowflakecomputing.com/sso/login",
        )
        .unwrap());
    }

    #[test]
    fn shares_origin_rejects_different_host() {
        assert!(!shares_origin(
            "https://acme.snowflakecomputing.com/auth",
            "https://evil.example.com/sso/login",
        )
        .unwrap());
    }

    #[test]
    fn extract_form_action_finds_first_form() {
        let html = r#"<html><body><form id="f1" action="https://idp.example.com/post" method="post"><input/></form></body></html>"#;
        let action = extract_first_form_action(html).unwrap();
        assert_eq!(action, "https://idp.example.com/post");
    }

    #[test]
    fn form_target_mismatch_is_rejected_as_exfiltration() {
        let config = SamlConfig {
            username: "alice".into(),
            password: "hunter2".into(),
            authenticator_url: "https://acme.snowflakecomputing.com".into(),
        };
        let err = validate_form_target(&config, "https://attacker.example.com/collect").unwrap_err();
        assert!(matches!(err, WarehouseError::AuthorizationFlowFailed(_)));
    }

    #[test]
    fn form_target_match_is_accepted() {
        let config = SamlConfig {
            username: "alice".into(),
            password: "hunter2".into(),
            authenticator_url: "https://acme.snowflakecomputing.com".into(),
        };
        assert!(validate_form_target(&config, "https://acme.snowflakecomputing.com/saml/complete").is_ok());
    }
}

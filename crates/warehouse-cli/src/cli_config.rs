//! Resolves a [`Config`] from a TOML connection file overlaid with CLI
//! flags, the same "file defaults, flags win" shape as the teacher's
//! `Config::load_or_default` plus CLI override in `commands::auth`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Args;
use warehouse_core::config::{Config, CredentialSelector, load_toml_fragment};

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Account locator, e.g. "acme" for acme.snowflakecomputing.com.
    #[arg(long)]
    pub account: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub warehouse: Option<String>,
    #[arg(long)]
    pub database: Option<String>,
    #[arg(long)]
    pub schema: Option<String>,
    #[arg(long)]
    pub role: Option<String>,

    /// One of: password, keypair, oauth_token, oauth_authorization_code,
    /// oauth_client_credentials, saml, workload_identity.
    #[arg(long, default_value = "password")]
    pub authenticator: String,

    #[arg(long, env = "WAREHOUSE_PASSWORD")]
    pub password: Option<String>,
    #[arg(long)]
    pub passcode: Option<String>,

    /// Path to a DER-encoded PKCS8 private key file (keypair authenticator).
    #[arg(long)]
    pub private_key_path: Option<std::path::PathBuf>,

    /// Bearer token (oauth_token authenticator).
    #[arg(long, env = "WAREHOUSE_TOKEN")]
    pub token: Option<String>,

    #[arg(long)]
    pub client_id: Option<String>,
    #[arg(long, env = "WAREHOUSE_CLIENT_SECRET")]
    pub client_secret: Option<String>,
    #[arg(long)]
    pub authorize_url: Option<String>,
    #[arg(long)]
    pub token_url: Option<String>,
}

/// Loads the optional TOML connection file and layers `args` on top of it;
/// CLI flags always win over the file.
pub fn resolve(args: &ConnectionArgs, config_path: Option<&str>) -> anyhow::Result<Config> {
    let fragment = match config_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read {path}: {e}"))?;
            load_toml_fragment(&contents)?
        }
        None => Default::default(),
    };

    let account = args
        .account
        .clone()
        .or(fragment.account)
        .ok_or_else(|| anyhow::anyhow!("--account is required (or set it in the connection file)"))?;
    let user = args
        .user
        .clone()
        .or(fragment.user)
        .ok_or_else(|| anyhow::anyhow!("--user is required (or set it in the connection file)"))?;

    let mut builder = Config::builder(account, user);
    if let Some(host) = args.host.clone().or(fragment.host) {
        builder = builder.host(host);
    }
    if let Some(port) = args.port.or(fragment.port) {
        builder = builder.port(port);
    }
    if let Some(warehouse) = args.warehouse.clone().or(fragment.warehouse) {
        builder = builder.warehouse(warehouse);
    }
    if let Some(database) = args.database.clone().or(fragment.database) {
        builder = builder.database(database);
    }
    if let Some(schema) = args.schema.clone().or(fragment.schema) {
        builder = builder.schema(schema);
    }
    if let Some(role) = args.role.clone().or(fragment.role) {
        builder = builder.role(role);
    }

    builder = builder.credentials(credentials_from_args(args)?);
    Ok(builder.build())
}

fn credentials_from_args(args: &ConnectionArgs) -> anyhow::Result<CredentialSelector> {
    match args.authenticator.as_str() {
        "password" => Ok(CredentialSelector::Password {
            password: args
                .password
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--password is required for the password authenticator"))?,
            passcode: args.passcode.clone(),
            passcode_in_password: false,
        }),
        "keypair" => {
            let path = args
                .private_key_path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("--private-key-path is required for the keypair authenticator"))?;
            let der = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("failed to read private key {}: {e}", path.display()))?;
            Ok(CredentialSelector::KeyPair {
                private_key_b64: STANDARD.encode(der),
                jwt_client_timeout_secs: 60,
            })
        }
        "oauth_token" => Ok(CredentialSelector::OAuthToken {
            token: args
                .token
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--token is required for the oauth_token authenticator"))?,
        }),
        "oauth_authorization_code" => Ok(CredentialSelector::OAuthAuthorizationCode {
            client_id: args
                .client_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--client-id is required for oauth_authorization_code"))?,
            authorize_url: args
                .authorize_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--authorize-url is required for oauth_authorization_code"))?,
            token_url: args
                .token_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--token-url is required for oauth_authorization_code"))?,
            scopes: vec!["session:role:any".to_string()],
            redirect_port: None,
        }),
        "oauth_client_credentials" => Ok(CredentialSelector::OAuthClientCredentials {
            client_id: args
                .client_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--client-id is required for oauth_client_credentials"))?,
            client_secret: args
                .client_secret
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--client-secret is required for oauth_client_credentials"))?,
            token_url: args
                .token_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--token-url is required for oauth_client_credentials"))?,
            scopes: vec!["session:role:any".to_string()],
        }),
        "saml" => Ok(CredentialSelector::Saml {
            username: args.user.clone().unwrap_or_default(),
            password: args
                .password
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--password is required for the saml authenticator"))?,
            authenticator_url: args
                .authorize_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--authorize-url is required for the saml authenticator"))?,
        }),
        "workload_identity" => Ok(CredentialSelector::WorkloadIdentity {
            provider: None,
            token: args.token.clone(),
        }),
        other => Err(anyhow::anyhow!("unknown authenticator: {other}")),
    }
}

//! Connection configuration.
//!
//! [`Config`] is the immutable bag of connection options owned by a
//! connection for its lifetime (spec §3.1). DSN string parsing and TOML
//! connection-file discovery are adapter concerns outside this crate;
//! `Config` is constructed already-parsed, the way the host builds a
//! `Config::builder()` from whatever DSN/TOML layer it owns.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::AccountId;

/// Top-level immutable connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub account: String,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub credentials: CredentialSelector,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub timeouts: TimeoutConfig,
    pub transfer: TransferConfig,
    pub session: SessionConfig,
    pub proxy: ProxyConfig,
    /// Parameters not otherwise recognised are passed through as session
    /// parameters on login (spec §6.1).
    pub passthrough_params: std::collections::BTreeMap<String, String>,
}

impl Config {
    /// Minimal builder entry point used by adapters once a DSN/TOML layer
    /// has already resolved concrete values.
    pub fn builder(account: impl Into<String>, user: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(account, user)
    }

    /// The cache id used to key the per-connection result cache (spec §4.1,
    /// §9): connections that share account+user+host share a cache.
    pub fn cache_id(&self) -> String {
        format!("{}:{}:{}", self.account, self.user, self.host)
    }

    /// Derives the base URL for session endpoints.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Builder for [`Config`] with the teacher's `Default`-then-override pattern.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    pub fn new(account: impl Into<String>, user: impl Into<String>) -> Self {
        let account = account.into();
        let host = format!("{account}.snowflakecomputing.com");
        Self {
            inner: Config {
                account,
                user: user.into(),
                host,
                port: 443,
                scheme: "https".to_string(),
                credentials: CredentialSelector::Password {
                    password: String::new(),
                    passcode: None,
                    passcode_in_password: false,
                },
                database: None,
                schema: None,
                warehouse: None,
                role: None,
                timeouts: TimeoutConfig::default(),
                transfer: TransferConfig::default(),
                session: SessionConfig::default(),
                proxy: ProxyConfig::default(),
                passthrough_params: Default::default(),
            },
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.inner.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.inner.port = port;
        self
    }

    pub fn credentials(mut self, credentials: CredentialSelector) -> Self {
        self.inner.credentials = credentials;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.inner.database = Some(database.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.inner.schema = Some(schema.into());
        self
    }

    pub fn warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.inner.warehouse = Some(warehouse.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.inner.role = Some(role.into());
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.inner.timeouts = timeouts;
        self
    }

    pub fn passthrough(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .passthrough_params
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Config {
        self.inner
    }
}

/// Selects the [`warehouse_auth`]-crate Authenticator variant to use.
///
/// This mirrors the teacher's `OAuth2Config`/credential split, generalised
/// to the full set of variants in spec §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSelector {
    Password {
        password: String,
        passcode: Option<String>,
        passcode_in_password: bool,
    },
    KeyPair {
        /// PKCS8 private key, base64url-encoded (spec §6.1 `privateKey`).
        private_key_b64: String,
        jwt_client_timeout_secs: u64,
    },
    OAuthAuthorizationCode {
        client_id: String,
        authorize_url: String,
        token_url: String,
        scopes: Vec<String>,
        redirect_port: Option<u16>,
    },
    OAuthClientCredentials {
        client_id: String,
        client_secret: String,
        token_url: String,
        scopes: Vec<String>,
    },
    OAuthToken {
        /// Caller already holds a bearer token (DSN `token` parameter).
        token: String,
    },
    Saml {
        username: String,
        password: String,
        authenticator_url: String,
    },
    WorkloadIdentity {
        provider: Option<WorkloadIdentityProvider>,
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadIdentityProvider {
    Aws,
    Gcp,
    Azure,
    Oidc,
}

/// Timeout configuration (spec §5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub login_timeout: Duration,
    pub request_timeout: Duration,
    pub client_timeout: Duration,
    pub external_browser_timeout: Duration,
    pub jwt_client_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            client_timeout: Duration::from_secs(900),
            external_browser_timeout: Duration::from_secs(120),
            jwt_client_timeout: Duration::from_secs(60),
        }
    }
}

/// File-transfer agent settings (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub parallel: usize,
    pub part_parallelism: usize,
    pub part_size_bytes: u64,
    pub large_file_threshold_bytes: u64,
    pub small_file_threshold_bytes: u64,
    pub tmp_dir_path: Option<PathBuf>,
    pub raise_put_get_error: bool,
    pub max_retry_attempts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            parallel: 4,
            part_parallelism: 4,
            part_size_bytes: 8 * 1024 * 1024,
            large_file_threshold_bytes: 200 * 1024 * 1024,
            small_file_threshold_bytes: 64 * 1024 * 1024,
            tmp_dir_path: None,
            raise_put_get_error: false,
            max_retry_attempts: 5,
        }
    }
}

/// Session-level settings: keep-alive heartbeat, result cache, chunk
/// downloader tuning (spec §4.1, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub client_session_keep_alive: bool,
    pub client_session_keep_alive_heartbeat_frequency: Option<Duration>,
    pub disable_query_context_cache: bool,
    pub query_context_cache_size: usize,
    pub max_chunk_download_workers: usize,
    pub chunk_backpressure_cap: usize,
    pub chunk_prefetch_window: usize,
    pub chunk_max_retry_attempts: u32,
    pub response_body_limit_bytes: u64,
    pub result_cache_ttl: Duration,
    pub single_authentication_prompt: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_session_keep_alive: false,
            client_session_keep_alive_heartbeat_frequency: None,
            disable_query_context_cache: false,
            query_context_cache_size: 5,
            max_chunk_download_workers: 8,
            chunk_backpressure_cap: 4,
            chunk_prefetch_window: 4,
            chunk_max_retry_attempts: 7,
            response_body_limit_bytes: 100 * 1024 * 1024,
            result_cache_ttl: Duration::from_secs(3600),
            single_authentication_prompt: true,
        }
    }
}

/// HTTP proxy selection (spec §6.4: `NO_PROXY`/`HTTP_PROXY`/`HTTPS_PROXY`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Vec<String>,
}

impl ProxyConfig {
    /// Matches spec §6.4: suffix match on hostname, literal match on IP, no
    /// wildcards.
    pub fn bypasses(&self, host: &str) -> bool {
        self.no_proxy
            .iter()
            .any(|pattern| host == pattern || host.ends_with(&format!(".{pattern}")))
    }
}

/// An account identifier used purely for log correlation; not part of the
/// wire protocol.
pub fn account_id_for(config: &Config) -> AccountId {
    AccountId::from_name(&config.cache_id())
}

/// Loads a subset of [`Config`] from a TOML connection file (spec §6.4).
/// Only the fields the caller has already resolved need be present; the
/// rest retain builder defaults.
pub fn load_toml_fragment(contents: &str) -> Result<TomlConnectionFragment, toml::de::Error> {
    toml::from_str(contents)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConnectionFragment {
    pub account: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_host_from_account() {
        let cfg = Config::builder("acme", "alice").build();
        assert_eq!(cfg.host, "acme.snowflakecomputing.com");
        assert_eq!(cfg.port, 443);
        assert_eq!(cfg.base_url(), "https://acme.snowflakecomputing.com:443");
    }

    #[test]
    fn cache_id_is_stable_for_same_account_user_host() {
        let a = Config::builder("acme", "alice").build();
        let b = Config::builder("acme", "alice").build();
        assert_eq!(a.cache_id(), b.cache_id());
    }

    #[test]
    fn no_proxy_suffix_match() {
        let proxy = ProxyConfig {
            http_proxy: None,
            https_proxy: None,
            no_proxy: vec!["internal.example.com".to_string(), "10.0.0.1".to_string()],
        };
        assert!(proxy.bypasses("internal.example.com"));
        assert!(proxy.bypasses("svc.internal.example.com"));
        assert!(proxy.bypasses("10.0.0.1"));
        assert!(!proxy.bypasses("example.com"));
        assert!(!proxy.bypasses("notinternal.example.com"));
    }

    #[test]
    fn toml_fragment_parses_partial_connection() {
        let toml_src = r#"
            account = "acme"
            user = "alice"
            warehouse = "COMPUTE_WH"
        "#;
        let frag = load_toml_fragment(toml_src).unwrap();
        assert_eq!(frag.account.as_deref(), Some("acme"));
        assert_eq!(frag.warehouse.as_deref(), Some("COMPUTE_WH"));
        assert!(frag.database.is_none());
    }

    #[test]
    fn passthrough_params_roundtrip() {
        let cfg = Config::builder("acme", "alice")
            .passthrough("CLIENT_APP_ID", "demo")
            .build();
        assert_eq!(
            cfg.passthrough_params.get("CLIENT_APP_ID").map(String::as_str),
            Some("demo")
        );
    }
}

//! Authenticator suite (spec §4.3, Component C): password, key-pair JWT,
//! OAuth (authorization code + client credentials + bearer passthrough),
//! SAML, and workload identity, unified behind [`authenticator::Authenticator`].

pub mod authenticator;
pub mod keypair;
pub mod lock;
pub mod oauth_client_credentials;
pub mod oauth_code;
pub mod password;
pub mod saml;
pub mod workload_identity;

pub use authenticator::Authenticator;

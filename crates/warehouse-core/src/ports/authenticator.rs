//! `IAuthenticator` port: obtains or refreshes a session's initial token
//! material (spec §4.3 Component C). `warehouse-auth` provides the single
//! implementation, internally dispatching over a tagged `Authenticator`
//! enum rather than exposing one trait object per strategy (per the
//! tagged-variant dispatch design note).

use async_trait::async_trait;

use crate::config::Config;
use crate::ports::session_client::{LoginOutcome, SessionParameters};
use crate::domain::WarehouseError;

/// What an authenticator hands back before the session client has wrapped
/// it into a full [`LoginOutcome`] (spec §4.3: "token, masterToken,
/// sessionID, serverParameters, sessionInfo").
#[derive(Debug, Clone)]
pub struct TokenMaterial {
    pub session_token: String,
    pub master_token: String,
    pub id_token: Option<String>,
    pub session_id: String,
    pub parameters: SessionParameters,
    pub master_validity_seconds: u64,
}

impl From<TokenMaterial> for LoginOutcome {
    fn from(material: TokenMaterial) -> Self {
        use crate::domain::newtypes::SecretToken;
        let tokens = crate::domain::TokenTriple::new(
            SecretToken::new(material.session_token)
                .expect("authenticator must not return an empty session token"),
            SecretToken::new(material.master_token)
                .expect("authenticator must not return an empty master token"),
            material.id_token.and_then(|t| SecretToken::new(t).ok()),
            chrono::Duration::seconds(material.master_validity_seconds as i64),
        );
        LoginOutcome {
            tokens,
            session_id: material.session_id,
            parameters: material.parameters,
            master_validity_seconds: material.master_validity_seconds,
        }
    }
}

#[async_trait]
pub trait IAuthenticator: Send + Sync {
    /// Obtains a fresh token triple using whichever strategy the
    /// authenticator variant implements.
    async fn obtain_token(&self, config: &Config) -> Result<TokenMaterial, WarehouseError>;

    /// Re-runs the same strategy; used for the single silent re-auth on
    /// well-known server codes (390104/390111, spec §4.3).
    async fn refresh(&self, config: &Config) -> Result<TokenMaterial, WarehouseError> {
        self.obtain_token(config).await
    }
}

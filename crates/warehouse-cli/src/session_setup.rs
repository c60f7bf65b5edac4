//! Wires `Config` -> `Transport` -> `Authenticator` -> `SessionClient` and
//! drives login, the same assembly every subcommand that talks to the
//! warehouse needs.

use std::sync::Arc;

use warehouse_auth::Authenticator;
use warehouse_core::config::Config;
use warehouse_core::ports::{IAuthenticator, ICloudSession, LoginOutcome};
use warehouse_session::SessionClient;
use warehouse_transport::{Transport, TransportConfig};

pub async fn login(config: Config) -> anyhow::Result<(Arc<SessionClient>, LoginOutcome)> {
    let transport_config = TransportConfig {
        request_timeout: config.timeouts.request_timeout,
        ..Default::default()
    };
    let transport = Arc::new(Transport::new(transport_config)?);
    let authenticator: Arc<dyn IAuthenticator> =
        Arc::new(Authenticator::from_config(&config, transport.clone()));
    let session = Arc::new(SessionClient::new(transport, authenticator, config.clone()));
    let outcome = session.login(&config).await?;
    Ok((session, outcome))
}

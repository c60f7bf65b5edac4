//! `warehouse auth login`: runs the configured authenticator strategy and
//! reports the resulting session, without submitting any statement.

use clap::Subcommand;

use crate::cli_config::{self, ConnectionArgs};
use crate::output::{get_formatter, OutputFormat};
use crate::session_setup;
use warehouse_core::ports::ICloudSession;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate and print the negotiated session id.
    Login {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

impl AuthCommand {
    pub async fn execute(&self, config_path: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
        let fmt = get_formatter(format);
        match self {
            AuthCommand::Login { connection } => {
                let config = cli_config::resolve(connection, config_path)?;
                let account = config.account.clone();
                let (session, outcome) = session_setup::login(config).await?;

                match format {
                    OutputFormat::Json => fmt.print_json(&serde_json::json!({
                        "authenticated": true,
                        "account": account,
                        "session_id": outcome.session_id,
                    })),
                    OutputFormat::Human => {
                        fmt.success(&format!("Authenticated against account {account}"));
                        fmt.info(&format!("Session id: {}", outcome.session_id));
                    }
                }

                session.close().await.ok();
                Ok(())
            }
        }
    }
}

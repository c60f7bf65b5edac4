//! `warehouse connect`: exercises login end to end and reports the
//! negotiated session, then closes it. Useful for verifying a connection
//! profile without running a statement.

use clap::Args;

use crate::cli_config::{self, ConnectionArgs};
use crate::output::{get_formatter, OutputFormat};
use crate::session_setup;
use warehouse_core::ports::ICloudSession;

#[derive(Debug, Args)]
pub struct ConnectCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl ConnectCommand {
    pub async fn execute(&self, config_path: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
        let fmt = get_formatter(format);
        let config = cli_config::resolve(&self.connection, config_path)?;
        let base_url = config.base_url();
        let (session, outcome) = session_setup::login(config).await?;

        match format {
            OutputFormat::Json => fmt.print_json(&serde_json::json!({
                "connected": true,
                "base_url": base_url,
                "session_id": outcome.session_id,
            })),
            OutputFormat::Human => {
                fmt.success(&format!("Connected to {base_url}"));
                fmt.info(&format!("Session id: {}", outcome.session_id));
                if let Some(db) = &outcome.parameters.database {
                    fmt.info(&format!("Database: {db}"));
                }
            }
        }

        session.close().await.ok();
        Ok(())
    }
}

//! `warehouse query`: submits one SQL statement, polls to completion, and
//! drains every result set's rows (inline batch plus any chunks) through
//! the chunk downloader.

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use warehouse_chunks::{ChunkCursor, ChunkDownloaderConfig};
use warehouse_core::domain::{QueryContextCache, RowsCursor};
use warehouse_core::ports::ICloudSession;
use warehouse_session::QueryExecutor;

use crate::cli_config::{self, ConnectionArgs};
use crate::output::{get_formatter, OutputFormat};
use crate::session_setup;

#[derive(Debug, Args)]
pub struct QueryCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// SQL text to execute.
    pub sql: String,

    #[arg(long)]
    pub multi_statement_count: Option<u32>,
}

impl QueryCommand {
    pub async fn execute(&self, config_path: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
        let fmt = get_formatter(format);
        let config = cli_config::resolve(&self.connection, config_path)?;
        let cache_size = config.session.query_context_cache_size;
        let (session, _outcome) = session_setup::login(config).await?;
        let session_dyn: Arc<dyn ICloudSession> = session.clone();

        let context_cache = QueryContextCache::new(Some(cache_size));
        let executor = QueryExecutor::new(session_dyn.clone(), context_cache);
        let outcome = executor
            .execute(&self.sql, self.multi_statement_count, None, CancellationToken::new())
            .await?;

        for descriptor in outcome.descriptors {
            let columns: Vec<String> = descriptor.columns.iter().map(|c| c.name.clone()).collect();
            let query_id = descriptor.query_id.clone();

            let mut cursor = ChunkCursor::spawn(
                tokio::runtime::Handle::current(),
                session_dyn.clone(),
                query_id,
                descriptor,
                ChunkDownloaderConfig::default(),
            );

            let mut rows = Vec::new();
            while let Some(row) = cursor.next()? {
                rows.push(row);
            }
            cursor.close();

            match format {
                OutputFormat::Json => {
                    let json_rows: Vec<serde_json::Value> = rows
                        .iter()
                        .map(|row| {
                            serde_json::Value::Array(
                                row.iter()
                                    .map(|cell| match cell {
                                        Some(v) => serde_json::Value::String(v.clone()),
                                        None => serde_json::Value::Null,
                                    })
                                    .collect(),
                            )
                        })
                        .collect();
                    fmt.print_json(&serde_json::json!({ "columns": columns, "rows": json_rows }));
                }
                OutputFormat::Human => {
                    fmt.info(&columns.join(" | "));
                    for row in &rows {
                        let rendered: Vec<String> =
                            row.iter().map(|c| c.clone().unwrap_or_else(|| "NULL".to_string())).collect();
                        fmt.info(&rendered.join(" | "));
                    }
                    fmt.success(&format!("{} row(s)", rows.len()));
                }
            }
        }

        session_dyn.close().await.ok();
        Ok(())
    }
}

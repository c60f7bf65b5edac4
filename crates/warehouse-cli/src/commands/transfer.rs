//! `warehouse put`/`warehouse get`: reassembles CLI flags into the same
//! `PUT`/`GET` statement grammar the driver recognises, then runs it
//! through the resolver and file transfer agent.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use warehouse_core::domain::{build_transfer_result_set, FileResultStatus};
use warehouse_core::ports::IObjectStore;
use warehouse_objectstore::ObjectStoreClient;
use warehouse_transfer::{parse_transfer_command, FileTransferAgent, StageResolver};

use crate::output::{get_formatter, OutputFormat};
use crate::stage_resolver::TomlStageResolver;

#[derive(Debug, Args)]
pub struct PutCommand {
    /// Local source, e.g. file:///tmp/*.csv
    pub source: String,
    /// Destination stage path, e.g. @mystage/dir
    pub destination: String,
    #[arg(long)]
    pub stage_manifest: String,
    #[arg(long)]
    pub parallel: Option<usize>,
    #[arg(long)]
    pub auto_compress: Option<bool>,
    #[arg(long)]
    pub overwrite: bool,
}

impl PutCommand {
    pub async fn execute(&self, format: OutputFormat) -> anyhow::Result<()> {
        let sql = format!(
            "PUT {} {}{}",
            self.source,
            self.destination,
            transfer_options(self.parallel, self.auto_compress, self.overwrite)
        );
        run_transfer(format, &self.stage_manifest, sql).await
    }
}

#[derive(Debug, Args)]
pub struct GetCommand {
    /// Source stage path, e.g. @mystage/dir/file.csv
    pub source: String,
    /// Local destination directory.
    pub destination: PathBuf,
    #[arg(long)]
    pub stage_manifest: String,
    #[arg(long)]
    pub parallel: Option<usize>,
    #[arg(long)]
    pub overwrite: bool,
}

impl GetCommand {
    pub async fn execute(&self, format: OutputFormat) -> anyhow::Result<()> {
        let sql = format!(
            "GET {} file://{}{}",
            self.source,
            self.destination.display(),
            transfer_options(self.parallel, None, self.overwrite)
        );
        run_transfer(format, &self.stage_manifest, sql).await
    }
}

fn transfer_options(parallel: Option<usize>, auto_compress: Option<bool>, overwrite: bool) -> String {
    let mut options = String::new();
    if let Some(parallel) = parallel {
        options.push_str(&format!(" PARALLEL={parallel}"));
    }
    if let Some(auto_compress) = auto_compress {
        options.push_str(&format!(" AUTO_COMPRESS={auto_compress}"));
    }
    if overwrite {
        options.push_str(" OVERWRITE=true");
    }
    options
}

async fn run_transfer(format: OutputFormat, stage_manifest: &str, sql: String) -> anyhow::Result<()> {
    let fmt = get_formatter(format);
    let resolver = TomlStageResolver::load(stage_manifest)?;
    let parsed = parse_transfer_command(&sql)?;
    let plan = resolver.resolve(&parsed).await?;

    let local_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let objects: Arc<dyn IObjectStore> =
        Arc::new(ObjectStoreClient::for_stage(&plan.stage, reqwest::Client::new(), &local_root));
    let agent = FileTransferAgent::new(objects);
    let metas = agent.execute(&plan).await?;
    let rows = build_transfer_result_set(&metas);

    match format {
        OutputFormat::Json => fmt.print_json(&serde_json::to_value(&rows)?),
        OutputFormat::Human => {
            for row in &rows {
                fmt.info(&format!("{} -> {} [{:?}]", row.source, row.target, row.status));
            }
        }
    }

    let failed = rows.iter().filter(|r| matches!(r.status, FileResultStatus::Error { .. })).count();
    if failed == 0 {
        fmt.success(&format!("{} file(s) transferred", rows.len()));
    } else {
        fmt.error(&format!("{failed} of {} file(s) failed", rows.len()));
    }
    Ok(())
}

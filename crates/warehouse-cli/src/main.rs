//! Command-line client for the warehouse driver core: connect, run a
//! statement, and stage PUT/GET, wiring together the session, chunk, and
//! transfer crates the way a host application would.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli_config;
mod commands;
mod output;
mod session_setup;
mod stage_resolver;

use commands::{AuthCommand, ConnectCommand, GetCommand, PutCommand, QueryCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "warehouse", version, about = "Command-line client for the warehouse driver core")]
struct Cli {
    /// Output in JSON format.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML connection file providing defaults for account/user/etc.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in and report the negotiated session, then disconnect.
    Connect(ConnectCommand),
    /// Run one SQL statement and print its result set(s).
    Query(QueryCommand),
    /// Upload local file(s) to a stage.
    Put(PutCommand),
    /// Download file(s) from a stage.
    Get(GetCommand),
    /// Authentication commands.
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Human };
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Connect(cmd) => cmd.execute(config_path, format).await,
        Commands::Query(cmd) => cmd.execute(config_path, format).await,
        Commands::Put(cmd) => cmd.execute(format).await,
        Commands::Get(cmd) => cmd.execute(format).await,
        Commands::Auth(cmd) => cmd.execute(config_path, format).await,
    }
}

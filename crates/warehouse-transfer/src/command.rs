//! Local PUT/GET grammar recognition (spec §4.4 step 0). The driver
//! parses the command text itself rather than sending it to the server
//! verbatim, the same way it locally recognises `file://` sources before
//! any network call happens. Stage credentials are not resolved here —
//! see [`StageResolver`] and the crate-level docs for why.

use async_trait::async_trait;
use warehouse_core::domain::{FileTransferPlan, TransferCommand, WarehouseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: TransferCommand,
    /// Local glob patterns for PUT, stage-relative patterns for GET.
    pub patterns: Vec<String>,
    pub stage_path: String,
    pub parallel: usize,
    pub part_parallelism: usize,
    pub auto_compress: bool,
    pub overwrite: bool,
}

/// Resolves a [`ParsedCommand`] into a fully credentialed
/// [`FileTransferPlan`] — the step that would otherwise require a
/// `ResultDescriptor` field or `ICloudSession` method this codebase's
/// session port does not define (see DESIGN.md). Implementations call
/// whatever control-plane RPC actually hands back `StageInfo` for the
/// parsed stage path.
#[async_trait]
pub trait StageResolver: Send + Sync {
    async fn resolve(&self, parsed: &ParsedCommand) -> Result<FileTransferPlan, WarehouseError>;
}

const DEFAULT_PARALLEL: usize = crate::partition::DEFAULT_CONCURRENCY;

/// Parses a `PUT`/`GET` statement's surface grammar:
/// `PUT file://<pattern> <stage path> [PARALLEL=n] [AUTO_COMPRESS=true|false] [OVERWRITE=true|false]`
/// `GET <stage path> file://<dir> [PARALLEL=n] [OVERWRITE=true|false]`
pub fn parse_transfer_command(sql: &str) -> Result<ParsedCommand, WarehouseError> {
    let trimmed = strip_leading_comments(sql.trim());
    let mut tokens = trimmed.split_whitespace();

    let verb = tokens
        .next()
        .ok_or_else(|| WarehouseError::InvalidTransferCommand("empty statement".to_string()))?
        .to_ascii_uppercase();

    let command = match verb.as_str() {
        "PUT" => TransferCommand::Put,
        "GET" => TransferCommand::Get,
        other => {
            return Err(WarehouseError::InvalidTransferCommand(format!(
                "expected PUT or GET, found {other}"
            )))
        }
    };

    let rest: Vec<&str> = tokens.collect();
    if rest.len() < 2 {
        return Err(WarehouseError::InvalidTransferCommand(
            "PUT/GET requires a source and a destination".to_string(),
        ));
    }

    let (source_token, destination_token, options) = (rest[0], rest[1], &rest[2..]);

    let mut parsed = ParsedCommand {
        command,
        patterns: Vec::new(),
        stage_path: String::new(),
        parallel: DEFAULT_PARALLEL,
        part_parallelism: DEFAULT_PARALLEL,
        auto_compress: true,
        overwrite: false,
    };

    match command {
        TransferCommand::Put => {
            parsed.patterns = vec![strip_file_scheme(source_token)?];
            parsed.stage_path = destination_token.to_string();
        }
        TransferCommand::Get => {
            parsed.patterns = vec![source_token.to_string()];
            parsed.stage_path = strip_file_scheme(destination_token)?;
        }
    }

    for option in options {
        apply_option(&mut parsed, option)?;
    }

    Ok(parsed)
}

fn apply_option(parsed: &mut ParsedCommand, option: &str) -> Result<(), WarehouseError> {
    let (key, value) = option
        .split_once('=')
        .ok_or_else(|| WarehouseError::InvalidTransferCommand(format!("malformed option: {option}")))?;

    match key.to_ascii_uppercase().as_str() {
        "PARALLEL" => {
            parsed.parallel = value
                .parse()
                .map_err(|_| WarehouseError::InvalidTransferCommand(format!("invalid PARALLEL value: {value}")))?;
            parsed.part_parallelism = parsed.parallel;
        }
        "AUTO_COMPRESS" => {
            parsed.auto_compress = parse_bool(value)?;
        }
        "OVERWRITE" => {
            parsed.overwrite = parse_bool(value)?;
        }
        other => {
            return Err(WarehouseError::InvalidTransferCommand(format!(
                "unrecognised option: {other}"
            )))
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, WarehouseError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(WarehouseError::InvalidTransferCommand(format!(
            "expected true/false, found {other}"
        ))),
    }
}

fn strip_file_scheme(token: &str) -> Result<String, WarehouseError> {
    token
        .strip_prefix("file://")
        .map(ToString::to_string)
        .ok_or_else(|| WarehouseError::InvalidTransferCommand(format!("expected file:// source, found {token}")))
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut remaining = sql;
    loop {
        let trimmed = remaining.trim_start();
        if let Some(rest) = trimmed.strip_prefix("/*") {
            if let Some(end) = rest.find("*/") {
                remaining = &rest[end + 2..];
                continue;
            }
        }
        return trimmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_put_with_options() {
        let parsed = parse_transfer_command("PUT file:///tmp/a*.csv @stage/dir PARALLEL=8 AUTO_COMPRESS=false").unwrap();
        assert_eq!(parsed.command, TransferCommand::Put);
        assert_eq!(parsed.patterns, vec!["/tmp/a*.csv".to_string()]);
        assert_eq!(parsed.stage_path, "@stage/dir");
        assert_eq!(parsed.parallel, 8);
        assert!(!parsed.auto_compress);
    }

    #[test]
    fn parses_get_and_strips_file_scheme_from_destination() {
        let parsed = parse_transfer_command("GET @stage/dir/a.csv file:///tmp/out").unwrap();
        assert_eq!(parsed.command, TransferCommand::Get);
        assert_eq!(parsed.patterns, vec!["@stage/dir/a.csv".to_string()]);
        assert_eq!(parsed.stage_path, "/tmp/out");
    }

    #[test]
    fn skips_leading_block_comments() {
        let parsed = parse_transfer_command("/* trace_id=abc */ PUT file:///a.csv @s").unwrap();
        assert_eq!(parsed.command, TransferCommand::Put);
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(parse_transfer_command("SELECT 1").is_err());
    }

    #[test]
    fn rejects_missing_destination() {
        assert!(parse_transfer_command("PUT file:///a.csv").is_err());
    }
}

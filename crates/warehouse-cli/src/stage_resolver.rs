//! Concrete [`StageResolver`]: resolves `@stage/...` tokens against a
//! local TOML stage manifest rather than a control-plane RPC.
//!
//! The session port this codebase builds on (`ICloudSession`) has no
//! method that hands back a `StageInfo` for a stage name — that RPC shape
//! was out of scope upstream (see DESIGN.md). Until it exists, operators
//! list their stages' credentials in a manifest file next to their
//! connection file, and this resolver reads it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use warehouse_core::domain::{FileTransferPlan, StageInfo, StagePath, TransferCommand, WarehouseError};
use warehouse_transfer::{ParsedCommand, StageResolver};

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    stages: HashMap<String, StageInfo>,
}

pub struct TomlStageResolver {
    stages: HashMap<String, StageInfo>,
}

impl TomlStageResolver {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read stage manifest {path}: {e}"))?;
        let manifest: ManifestFile = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("malformed stage manifest {path}: {e}"))?;
        Ok(Self { stages: manifest.stages })
    }

    /// Splits `@stagename/rest/of/path` into the manifest entry and the
    /// remaining stage-relative path, which for GET becomes the
    /// `list_prefix` pattern (itself relative to the stage's own
    /// `path_prefix`, per `IObjectStore`'s key convention).
    fn resolve_stage(&self, stage_path: &str) -> Result<(StageInfo, String), WarehouseError> {
        let trimmed = stage_path.trim_start_matches('@');
        let mut parts = trimmed.splitn(2, '/');
        let name = parts.next().unwrap_or_default();
        let remainder = parts.next().unwrap_or_default().to_string();
        let stage = self
            .stages
            .get(name)
            .cloned()
            .ok_or_else(|| WarehouseError::InvalidTransferCommand(format!("unknown stage: @{name}")))?;
        Ok((stage, remainder))
    }
}

#[async_trait]
impl StageResolver for TomlStageResolver {
    async fn resolve(&self, parsed: &ParsedCommand) -> Result<FileTransferPlan, WarehouseError> {
        match parsed.command {
            TransferCommand::Put => {
                let (stage, _) = self.resolve_stage(&parsed.stage_path)?;
                Ok(FileTransferPlan {
                    command: TransferCommand::Put,
                    stage,
                    sources: parsed.patterns.clone(),
                    destination: StagePath::new(parsed.stage_path.clone())?,
                    parallel: parsed.parallel,
                    part_parallelism: parsed.part_parallelism,
                    auto_compress: parsed.auto_compress,
                    source_compression: None,
                    overwrite: parsed.overwrite,
                })
            }
            TransferCommand::Get => {
                let pattern = parsed.patterns.first().cloned().unwrap_or_default();
                let (stage, relative) = self.resolve_stage(&pattern)?;
                Ok(FileTransferPlan {
                    command: TransferCommand::Get,
                    stage,
                    sources: vec![relative],
                    destination: StagePath::new(parsed.stage_path.clone())?,
                    parallel: parsed.parallel,
                    part_parallelism: parsed.part_parallelism,
                    auto_compress: parsed.auto_compress,
                    source_compression: None,
                    overwrite: parsed.overwrite,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::StageProvider;

    fn manifest() -> String {
        r#"
        [stages.mystage]
        provider = "local"
        bucket_or_container = "local"
        path_prefix = "stage1"
        "#
        .to_string()
    }

    #[tokio::test]
    async fn resolves_put_against_manifest_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stages.toml");
        tokio::fs::write(&path, manifest()).await.unwrap();
        let resolver = TomlStageResolver::load(path.to_str().unwrap()).unwrap();

        let parsed = ParsedCommand {
            command: TransferCommand::Put,
            patterns: vec!["/tmp/a.csv".to_string()],
            stage_path: "@mystage/subdir".to_string(),
            parallel: 4,
            part_parallelism: 4,
            auto_compress: true,
            overwrite: false,
        };
        let plan = resolver.resolve(&parsed).await.unwrap();
        assert_eq!(plan.stage.provider, StageProvider::Local);
        assert_eq!(plan.stage.path_prefix, "stage1");
    }

    #[tokio::test]
    async fn unknown_stage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stages.toml");
        tokio::fs::write(&path, manifest()).await.unwrap();
        let resolver = TomlStageResolver::load(path.to_str().unwrap()).unwrap();

        let parsed = ParsedCommand {
            command: TransferCommand::Get,
            patterns: vec!["@nope/a.csv".to_string()],
            stage_path: "/tmp/out".to_string(),
            parallel: 4,
            part_parallelism: 4,
            auto_compress: true,
            overwrite: false,
        };
        assert!(resolver.resolve(&parsed).await.is_err());
    }
}

//! File Transfer Agent (spec §4.4, Component G): parses PUT/GET locally,
//! sniffs/applies compression, digests and optionally encrypts payloads,
//! then drives upload or download against a `warehouse-objectstore`
//! adapter with the spec's large/small-file concurrency policy.

pub mod agent;
pub mod command;
pub mod compression;
pub mod digest;
pub mod encryption;
pub mod partition;
pub mod status;

pub use agent::FileTransferAgent;
pub use command::{parse_transfer_command, ParsedCommand, StageResolver};

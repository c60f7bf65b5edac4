//! Result Pipeline: the chunk downloader (spec §4.2, Component F).
//!
//! [`downloader::ChunkCursor`] is the `RowsCursor` a `warehouse-session`
//! query executor hands back to its caller once a `ResultDescriptor` is
//! available.

pub mod decode;
pub mod downloader;
pub mod fetcher;

pub use decode::{decode_chunk, present_scalar_kind, ScalarKind};
pub use downloader::{ChunkCursor, ChunkDownloaderConfig};
pub use fetcher::ChunkFetcher;

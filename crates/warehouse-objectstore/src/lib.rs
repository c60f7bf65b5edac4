//! Provider-tagged `IObjectStore` adapters (spec §4.4, Component H): one
//! module per stage provider plus the filesystem-backed [`local::LocalClient`]
//! used for internal stages and tests. [`client::ObjectStoreClient`] is
//! the tagged-variant entry point `warehouse-transfer` constructs from a
//! resolved `StageInfo`.

mod azure;
mod client;
mod gcs;
mod key;
mod local;
mod retry;
mod s3;
mod xml_lite;
mod xml_multipart;

pub use azure::AzureClient;
pub use client::ObjectStoreClient;
pub use gcs::GcsClient;
pub use local::LocalClient;
pub use s3::S3Client;

//! Port definitions (hexagonal architecture interfaces).
//!
//! These traits form the boundary adapter crates implement so the
//! executor/downloader/transfer logic they drive can be exercised without
//! real I/O in tests.
//!
//! - [`IAuthenticator`] — obtains/refreshes token material (`warehouse-auth`)
//! - [`ICloudSession`] — login/renew/close/submit/poll/cancel (`warehouse-session`)
//! - [`IChunkSource`] — fetches one result chunk's bytes (`warehouse-chunks`)
//! - [`IObjectStore`] — provider-specific upload/download primitives (`warehouse-objectstore`)

pub mod authenticator;
pub mod chunk_source;
pub mod object_store;
pub mod session_client;

pub use authenticator::{IAuthenticator, TokenMaterial};
pub use chunk_source::IChunkSource;
pub use object_store::{CompletedPart, IObjectStore, ObjectStat, PartUploadRequest};
pub use session_client::{ICloudSession, LoginOutcome, SessionParameters, SubmitOutcome};

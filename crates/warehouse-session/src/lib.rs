//! Session, Query Executor, and Result Cache (spec §4.1 Components
//! B/D/E): the `ICloudSession` adapter, its token-refresh discipline, the
//! submit/poll/cancel driver loop, and a per-connection result cache.

pub mod heartbeat;
pub mod query_executor;
pub mod result_cache;
pub mod session_client;
pub mod token_accessor;

pub use heartbeat::Heartbeat;
pub use query_executor::{ExecuteOutcome, QueryExecutor};
pub use result_cache::ResultCache;
pub use session_client::SessionClient;
pub use token_accessor::TokenAccessor;

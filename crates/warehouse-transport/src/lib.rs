//! HTTP transport wrapper for the warehouse session protocol (spec §4.5,
//! Component A).
//!
//! Wraps `reqwest::Client` with:
//! - per-operation-class retry budgets and exponential backoff with full
//!   jitter
//! - standard headers (`User-Agent`, `Authorization`, request GUID)
//! - a response-body size cap
//! - stable request-id reuse across retries of the same logical statement

pub mod backoff;
pub mod headers;
pub mod transport;

pub use backoff::{BackoffPolicy, OperationClass};
pub use transport::{Transport, TransportConfig, TransportRequest};

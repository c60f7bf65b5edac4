//! Shared 5xx/network retry loop for the REST-based provider adapters,
//! reusing the file-transfer operation class's attempt budget and
//! backoff curve from the session/chunk transports.

use warehouse_core::domain::WarehouseError;
use warehouse_transport::{BackoffPolicy, OperationClass};

/// Runs `attempt` up to `OperationClass::FileTransfer`'s attempt budget,
/// retrying on `Ok(None)` (server error, try again) and giving up
/// immediately on `Err` (non-retryable).
pub(crate) async fn with_retry<T, F, Fut>(op: &str, mut attempt: F) -> Result<T, WarehouseError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, RetryOutcome>>,
{
    let backoff = BackoffPolicy::default();
    let max_attempts = OperationClass::FileTransfer.max_attempts();

    for n in 0..max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(RetryOutcome::Terminal(err)) => return Err(err),
            Err(RetryOutcome::Retryable(message)) => {
                if n + 1 >= max_attempts {
                    return Err(WarehouseError::ObjectStore(format!(
                        "{op} failed after {max_attempts} attempt(s): {message}"
                    )));
                }
                tracing::warn!(op, attempt = n, %message, "object store request failed, retrying");
                tokio::time::sleep(backoff.delay_for(n)).await;
            }
        }
    }

    unreachable!("loop always returns on the last attempt")
}

pub(crate) enum RetryOutcome {
    Retryable(String),
    Terminal(WarehouseError),
}

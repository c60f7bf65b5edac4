//! Classifies an `IObjectStore` failure into the next `FileResultStatus`
//! (spec §4.4, Invariant 3.2.6). `IObjectStore` only reports a flat
//! `WarehouseError::ObjectStore(String)`, so distinguishing "credential
//! expired" from "server overloaded, back off harder" from "transient,
//! just retry" falls back to matching on the status-line text the REST
//! adapters fold into that string (see DESIGN.md's note on this gap).

use warehouse_core::domain::{FileResultStatus, WarehouseError};

const MAX_RETRY_ATTEMPTS: u32 = 5;

pub fn classify_object_store_failure(err: &WarehouseError, previous_attempts: u32, current_parallelism: usize) -> FileResultStatus {
    let message = match err {
        WarehouseError::ObjectStore(message) => message.as_str(),
        _ => return FileResultStatus::Error { message: err.to_string() },
    };

    if previous_attempts + 1 >= MAX_RETRY_ATTEMPTS {
        return FileResultStatus::Error {
            message: format!("giving up after {previous_attempts} attempt(s): {message}"),
        };
    }

    let lower = message.to_ascii_lowercase();
    if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("expired") {
        FileResultStatus::RenewPresignedUrl
    } else if lower.contains("404") || lower.contains("not found") || lower.contains("nosuchkey") {
        FileResultStatus::NotFoundFile
    } else if lower.contains("slowdown") || lower.contains("503") || lower.contains("throttl") || lower.contains("too many requests") {
        FileResultStatus::NeedRetryWithLowerConcurrency {
            attempt: previous_attempts + 1,
            parallelism: (current_parallelism / 2).max(1),
        }
    } else {
        FileResultStatus::NeedRetry {
            attempt: previous_attempts + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(msg: &str) -> WarehouseError {
        WarehouseError::ObjectStore(msg.to_string())
    }

    #[test]
    fn unauthorized_maps_to_renew_presigned_url() {
        let status = classify_object_store_failure(&err("PUT failed: 403 Forbidden"), 0, 4);
        assert_eq!(status, FileResultStatus::RenewPresignedUrl);
    }

    #[test]
    fn missing_object_maps_to_not_found() {
        let status = classify_object_store_failure(&err("GET failed: 404 Not Found"), 0, 4);
        assert_eq!(status, FileResultStatus::NotFoundFile);
    }

    #[test]
    fn slow_down_halves_parallelism() {
        let status = classify_object_store_failure(&err("503 SlowDown"), 0, 8);
        assert_eq!(
            status,
            FileResultStatus::NeedRetryWithLowerConcurrency { attempt: 1, parallelism: 4 }
        );
    }

    #[test]
    fn generic_failure_is_a_plain_retry() {
        let status = classify_object_store_failure(&err("connection reset"), 0, 4);
        assert_eq!(status, FileResultStatus::NeedRetry { attempt: 1 });
    }

    #[test]
    fn exhausted_budget_becomes_terminal_error() {
        let status = classify_object_store_failure(&err("connection reset"), MAX_RETRY_ATTEMPTS - 1, 4);
        assert!(matches!(status, FileResultStatus::Error { .. }));
    }
}

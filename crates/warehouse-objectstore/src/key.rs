use warehouse_core::domain::StageInfo;

/// Joins a stage's `path_prefix` onto a caller-supplied key/prefix,
/// normalising the slash between them.
pub(crate) fn object_key(stage: &StageInfo, key: &str) -> String {
    let key = key.trim_start_matches('/');
    if stage.path_prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{key}", stage.path_prefix.trim_end_matches('/'))
    }
}

/// Reverses [`object_key`] on a listing result: providers' list APIs
/// return the full key under the bucket/container (path_prefix
/// included), but every other `IObjectStore` method expects a key
/// relative to the stage's `path_prefix`. Keeping that invariant here
/// means callers never have to special-case listed keys.
pub(crate) fn strip_stage_prefix(stage: &StageInfo, full_key: &str) -> String {
    if stage.path_prefix.is_empty() {
        return full_key.to_string();
    }
    let prefix = format!("{}/", stage.path_prefix.trim_end_matches('/'));
    full_key.strip_prefix(&prefix).unwrap_or(full_key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warehouse_core::domain::StageProvider;

    fn stage(prefix: &str) -> StageInfo {
        StageInfo {
            provider: StageProvider::S3,
            bucket_or_container: "bucket".to_string(),
            path_prefix: prefix.to_string(),
            region: None,
            endpoint: None,
            storage_account: None,
            qmk: None,
        }
    }

    #[test]
    fn joins_prefix_and_key() {
        assert_eq!(object_key(&stage("stages/load1"), "file.csv"), "stages/load1/file.csv");
    }

    #[test]
    fn empty_prefix_passes_key_through() {
        assert_eq!(object_key(&stage(""), "/file.csv"), "file.csv");
    }

    #[test]
    fn strip_stage_prefix_reverses_object_key() {
        let s = stage("stages/load1");
        let full = object_key(&s, "dir/file.csv");
        assert_eq!(strip_stage_prefix(&s, &full), "dir/file.csv");
    }

    #[test]
    fn strip_stage_prefix_is_a_no_op_without_a_prefix() {
        assert_eq!(strip_stage_prefix(&stage(""), "file.csv"), "file.csv");
    }
}

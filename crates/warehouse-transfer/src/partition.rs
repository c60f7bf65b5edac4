//! Part partitioning and the large/small concurrency policy (spec §4.4
//! "Concurrency policy"): files above the large-file threshold upload
//! their parts in parallel one file at a time; files at or below it
//! upload whole, but several files run concurrently.

pub const DEFAULT_PART_SIZE_BYTES: u64 = 8 * 1024 * 1024;
pub const LARGE_FILE_THRESHOLD_BYTES: u64 = 200 * 1024 * 1024;
pub const SMALL_FILE_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// File is large enough to warrant multipart upload; parts within it
    /// upload with this much parallelism, one file at a time.
    PartsInParallel { part_parallelism: usize },
    /// File is small enough to upload in one request; several such files
    /// run concurrently.
    WholeFilesConcurrently { parallel: usize },
}

pub fn concurrency_policy(file_size: u64, parallel: usize, part_parallelism: usize) -> ConcurrencyPolicy {
    if file_size > LARGE_FILE_THRESHOLD_BYTES {
        ConcurrencyPolicy::PartsInParallel {
            part_parallelism: part_parallelism.max(1),
        }
    } else {
        let _ = SMALL_FILE_THRESHOLD_BYTES;
        ConcurrencyPolicy::WholeFilesConcurrently {
            parallel: parallel.max(1),
        }
    }
}

/// Splits `total_len` into `(start, end_inclusive)` byte ranges of
/// `part_size` bytes each (the last part may be shorter).
pub fn plan_parts(total_len: u64, part_size: u64) -> Vec<(u64, u64)> {
    if total_len == 0 {
        return Vec::new();
    }
    let part_size = part_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0u64;
    while start < total_len {
        let end = (start + part_size - 1).min(total_len - 1);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_parts_covering_the_whole_range() {
        let parts = plan_parts(25, 10);
        assert_eq!(parts, vec![(0, 9), (10, 19), (20, 24)]);
    }

    #[test]
    fn exact_multiple_has_no_short_trailing_part() {
        let parts = plan_parts(20, 10);
        assert_eq!(parts, vec![(0, 9), (10, 19)]);
    }

    #[test]
    fn empty_file_has_no_parts() {
        assert!(plan_parts(0, 10).is_empty());
    }

    #[test]
    fn large_files_upload_parts_in_parallel_small_files_run_concurrently() {
        assert_eq!(
            concurrency_policy(300 * 1024 * 1024, 4, 8),
            ConcurrencyPolicy::PartsInParallel { part_parallelism: 8 }
        );
        assert_eq!(
            concurrency_policy(10 * 1024 * 1024, 4, 8),
            ConcurrencyPolicy::WholeFilesConcurrently { parallel: 4 }
        );
    }
}

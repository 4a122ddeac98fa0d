use std::path::{Path, PathBuf};

/// Directory holding the metadata files for a pull request.
/// Shards by `number / 100` to keep directories small.
pub fn pull_request_dir(root: impl AsRef<Path>, number: u64) -> PathBuf {
    root.as_ref().join(format!("{:02}", number / 100)).join(number.to_string())
}

/// Directory holding the downloaded build metrics for a changeset on one platform.
pub fn build_metrics_dir(root: impl AsRef<Path>, changeset: &str, platform: &str) -> PathBuf {
    let prefix = changeset.get(..2).unwrap_or(changeset);
    root.as_ref().join(prefix).join(changeset).join(platform)
}

/// Truncate a CI timestamp (fractional seconds) to whole seconds.
#[inline]
pub fn unix_seconds(value: f64) -> i64 { value.trunc() as i64 }

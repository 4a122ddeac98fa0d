use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use landed_core::{models::PullRequestInfo, util::pull_request_dir};

const TITLE_FILE: &str = "title.txt";
const MERGE_COMMIT_FILE: &str = "merge_commit.txt";

/// Pull request metadata cache, one directory per pull request.
///
/// A pull request directory only ever appears complete: files are written to a
/// staging directory beside it and renamed into place, so the directory's
/// existence marks the metadata as stored.
#[derive(Debug, Clone)]
pub struct PullRequestStore {
    root: PathBuf,
}

impl PullRequestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn dir(&self, number: u64) -> PathBuf { pull_request_dir(&self.root, number) }

    pub fn contains(&self, number: u64) -> bool { self.dir(number).is_dir() }

    pub fn read(&self, number: u64) -> Result<Option<PullRequestInfo>> {
        let dir = self.dir(number);
        let title = match fs::read_to_string(dir.join(TITLE_FILE)) {
            Ok(title) => title,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read title of #{number}"));
            }
        };
        let merge_commit = match fs::read_to_string(dir.join(MERGE_COMMIT_FILE)) {
            Ok(sha) => Some(sha.trim().to_string()).filter(|sha| !sha.is_empty()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read merge commit of #{number}"));
            }
        };
        Ok(Some(PullRequestInfo { number, title, merge_commit }))
    }

    /// Store the metadata of a pull request. Returns `false` if it was already stored.
    pub fn commit(&self, info: &PullRequestInfo) -> Result<bool> {
        let dir = self.dir(info.number);
        if dir.exists() {
            return Ok(false);
        }
        let shard = dir.parent().context("Pull request directory has no parent")?;
        fs::create_dir_all(shard)
            .with_context(|| format!("Failed to create directory {}", shard.display()))?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", info.number))
            .tempdir_in(shard)
            .with_context(|| format!("Failed to create staging directory in {}", shard.display()))?;
        fs::write(staging.path().join(TITLE_FILE), &info.title)
            .with_context(|| format!("Failed to write title of #{}", info.number))?;
        fs::write(
            staging.path().join(MERGE_COMMIT_FILE),
            info.merge_commit.as_deref().unwrap_or_default(),
        )
        .with_context(|| format!("Failed to write merge commit of #{}", info.number))?;
        // From here on the staging directory is ours to move or clean up
        publish(&staging.keep(), &dir)
    }
}

fn publish(staged: &Path, dir: &Path) -> Result<bool> {
    match fs::rename(staged, dir) {
        Ok(()) => Ok(true),
        Err(e) => {
            if let Err(e) = fs::remove_dir_all(staged) {
                tracing::warn!("Failed to remove {}: {}", staged.display(), e);
            }
            // Another writer got there first
            if dir.is_dir() {
                Ok(false)
            } else {
                Err(e).with_context(|| format!("Failed to commit {}", dir.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(number: u64, merge_commit: Option<&str>) -> PullRequestInfo {
        PullRequestInfo {
            number,
            title: format!("PR {number}"),
            merge_commit: merge_commit.map(str::to_string),
        }
    }

    #[test]
    fn test_commit_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = PullRequestStore::new(dir.path());
        assert!(!store.contains(1234));
        assert_eq!(store.read(1234).unwrap(), None);

        assert!(store.commit(&info(1234, Some("abcdef"))).unwrap());
        assert!(dir.path().join("12/1234/title.txt").is_file());
        assert_eq!(
            fs::read_to_string(dir.path().join("12/1234/merge_commit.txt")).unwrap(),
            "abcdef"
        );
        assert_eq!(store.read(1234).unwrap(), Some(info(1234, Some("abcdef"))));

        // Staging directories do not linger
        let entries = fs::read_dir(dir.path().join("12")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_commit_is_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = PullRequestStore::new(dir.path());
        assert!(store.commit(&info(42, None)).unwrap());
        let mut changed = info(42, Some("ffff"));
        changed.title = "Other".to_string();
        assert!(!store.commit(&changed).unwrap());
        assert_eq!(store.read(42).unwrap(), Some(info(42, None)));
        assert_eq!(fs::read_to_string(dir.path().join("00/42/merge_commit.txt")).unwrap(), "");
    }

    #[test]
    fn test_publish_race_discards_staging() {
        let dir = tempfile::tempdir().unwrap();
        let store = PullRequestStore::new(dir.path());
        assert!(store.commit(&info(77, Some("aaaa"))).unwrap());

        // A second writer staged the same pull request before seeing the first commit
        let staged = dir.path().join("00/.77-late");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join(TITLE_FILE), "Late").unwrap();
        assert!(!publish(&staged, &store.dir(77)).unwrap());
        assert!(!staged.exists());
        assert_eq!(store.read(77).unwrap(), Some(info(77, Some("aaaa"))));
    }

    #[test]
    fn test_publish_failure() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join(".5-staged");
        fs::create_dir(&staged).unwrap();
        assert!(publish(&staged, &dir.path().join("missing/5")).is_err());
        assert!(!staged.exists());
    }
}

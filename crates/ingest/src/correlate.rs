use std::collections::{BTreeMap, BTreeSet};

use landed_core::{
    models::{BuildRecord, Landing},
    util::unix_seconds,
};
use landed_github::extract_pull_request;

/// Successful builds of one changeset, keyed by platform.
pub type ChangesetGroup = BTreeMap<String, BuildRecord>;

/// Group successful build records by changeset. Failed records and records without
/// a changeset are dropped. If a platform built the same changeset more than once,
/// the later record wins.
pub fn group_by_changeset(
    records: impl IntoIterator<Item = BuildRecord>,
) -> BTreeMap<String, ChangesetGroup> {
    let mut groups = BTreeMap::<String, ChangesetGroup>::new();
    for record in records {
        if !record.successful {
            tracing::debug!("{}: ignoring failed build {}", record.platform, record.number);
            continue;
        }
        let Some(changeset) = record.changeset.clone() else {
            continue;
        };
        groups.entry(changeset).or_default().insert(record.platform.clone(), record);
    }
    groups
}

/// Required platforms that have no build in the group.
pub fn missing_platforms<'a>(
    group: &ChangesetGroup,
    required: &'a BTreeSet<String>,
) -> Vec<&'a str> {
    required.iter().filter(|p| !group.contains_key(*p)).map(String::as_str).collect()
}

/// A group is complete when its platforms are a superset of the required ones.
pub fn is_complete(group: &ChangesetGroup, required: &BTreeSet<String>) -> bool {
    required.iter().all(|p| group.contains_key(p))
}

/// Work out which pull request landed the changeset, and when.
///
/// The build of the lexicographically smallest required platform is used, so an
/// optional builder never decides. Its first source change gives the commit message
/// and time; without one the changeset is taken to be a direct push, dated by the
/// start of the build's first step.
pub fn attribute(
    changeset: &str,
    group: &ChangesetGroup,
    required: &BTreeSet<String>,
) -> Option<Landing> {
    let (platform, record) =
        required.iter().find_map(|p| group.get_key_value(p)).or_else(|| group.iter().next())?;
    let (pull_request, time) = match record.changes.first() {
        Some(change) => {
            (extract_pull_request(&change.comments), change.when.or_else(|| record.started_at()))
        }
        None => (None, record.started_at()),
    };
    let Some(time) = time else {
        tracing::warn!("{}: no landing time in the {} build", changeset, platform);
        return None;
    };
    Some(Landing { changeset: changeset.to_string(), pull_request, time: unix_seconds(time) })
}

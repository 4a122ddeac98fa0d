//! Correlates CI builds into landed changes and stores them.

pub mod correlate;
pub mod metrics;

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use landed_buildbot::Buildbot;
use landed_core::{config::Config, models::BuildRecord};
use landed_db::Database;
use landed_github::{GitHub, PullRequestStore, resolve_pull_request};

use crate::{
    correlate::{ChangesetGroup, attribute, group_by_changeset, is_complete, missing_platforms},
    metrics::extract_metrics,
};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub already_present: usize,
    pub incomplete: usize,
    pub undated: usize,
}

enum Outcome {
    Inserted,
    AlreadyPresent,
    Undated,
}

pub struct Ingester<'a> {
    pub db: &'a Database,
    pub github: &'a GitHub,
    pub pull_requests: &'a PullRequestStore,
    pub required: BTreeSet<String>,
}

impl Ingester<'_> {
    /// Store every changeset whose builds cover the required platforms and
    /// that is not stored yet.
    pub async fn ingest(&self, records: Vec<BuildRecord>) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        for (changeset, group) in group_by_changeset(records) {
            if !is_complete(&group, &self.required) {
                tracing::info!(
                    "{}: missing platforms {}",
                    changeset,
                    missing_platforms(&group, &self.required).join(", ")
                );
                summary.incomplete += 1;
                continue;
            }
            match self.ingest_group(&changeset, &group).await? {
                Outcome::Inserted => summary.inserted += 1,
                Outcome::AlreadyPresent => summary.already_present += 1,
                Outcome::Undated => summary.undated += 1,
            }
        }
        Ok(summary)
    }

    async fn ingest_group(&self, changeset: &str, group: &ChangesetGroup) -> Result<Outcome> {
        if self.db.change_exists(changeset).await? {
            tracing::info!("{}: already done", changeset);
            return Ok(Outcome::AlreadyPresent);
        }
        let Some(landing) = attribute(changeset, group, &self.required) else {
            return Ok(Outcome::Undated);
        };
        if let Some(number) = landing.pull_request {
            // Metadata is best effort; the change is stored either way
            if let Err(e) = resolve_pull_request(self.github, self.pull_requests, number).await {
                tracing::warn!("{}: failed to retrieve #{}: {:?}", changeset, number, e);
            }
        }
        let builds = group.values().map(extract_metrics).collect::<Vec<_>>();
        match self.db.insert_landing(&landing, &builds).await? {
            Some(change_id) => {
                tracing::info!(
                    "{}: added ok (change {}, {} builds)",
                    changeset,
                    change_id,
                    builds.len()
                );
                Ok(Outcome::Inserted)
            }
            None => Ok(Outcome::AlreadyPresent),
        }
    }
}

/// Run one full ingestion pass: fetch the recent builds of every platform,
/// then store the changesets that completed.
pub async fn run(config: &Config, db: &Database) -> Result<IngestSummary> {
    let buildbot = Buildbot::new(&config.ci)?;
    let github = GitHub::new(&config.github)?;
    let pull_requests = PullRequestStore::new(config.paths.pull_requests.clone());
    let records = buildbot.fetch_all(&config.platforms.all()).await;
    tracing::info!("Fetched {} successful builds", records.len());
    let ingester = Ingester {
        db,
        github: &github,
        pull_requests: &pull_requests,
        required: config.platforms.required_set(),
    };
    let summary = ingester.ingest(records).await.context("Ingestion failed")?;
    tracing::info!(
        "Added {} changes ({} already present, {} incomplete, {} undated)",
        summary.inserted,
        summary.already_present,
        summary.incomplete,
        summary.undated
    );
    Ok(summary)
}

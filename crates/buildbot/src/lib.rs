//! Client for the buildbot JSON status API.

use std::{collections::HashMap, ops::RangeInclusive};

use anyhow::{Context, Result};
use landed_core::{
    config::CiConfig,
    models::{BuildRecord, BuildStep, SourceChange},
};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

#[derive(Clone)]
pub struct Buildbot {
    client: reqwest::Client,
    base: Url,
    builder_prefix: String,
    history: u32,
}

#[derive(Debug, Deserialize)]
struct RawBuild {
    #[serde(default)]
    text: Vec<String>,
    #[serde(default, rename = "sourceStamps")]
    source_stamps: Vec<RawSourceStamp>,
    // Older buildbot versions report a single source stamp
    #[serde(default, rename = "sourceStamp")]
    source_stamp: Option<RawSourceStamp>,
    #[serde(default)]
    steps: Vec<RawStep>,
    number: u64,
    #[serde(default)]
    slave: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSourceStamp {
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    #[serde(default)]
    comments: String,
    #[serde(default)]
    when: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: String,
    #[serde(default)]
    times: Vec<Option<f64>>,
}

impl RawBuild {
    fn into_record(self, platform: &str) -> BuildRecord {
        let successful = self.text == ["build", "successful"];
        let stamp = self.source_stamps.into_iter().next().or(self.source_stamp);
        let (changeset, changes) = match stamp {
            Some(stamp) => (stamp.revision.filter(|r| !r.is_empty()), stamp.changes),
            None => (None, vec![]),
        };
        BuildRecord {
            platform: platform.to_string(),
            changeset,
            successful,
            steps: self
                .steps
                .into_iter()
                .map(|s| BuildStep {
                    name: s.name,
                    start: s.times.first().copied().flatten(),
                    end: s.times.get(1).copied().flatten(),
                })
                .collect(),
            changes: changes
                .into_iter()
                .map(|c| SourceChange { comments: c.comments, when: c.when })
                .collect(),
            number: self.number,
            slave: self.slave,
        }
    }
}

impl Buildbot {
    pub fn new(config: &CiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("landed/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base: config.url.clone(),
            builder_prefix: config.builder_prefix.clone(),
            history: config.history,
        })
    }

    /// Relative slot indices requested from each builder, oldest first.
    pub fn slots(&self) -> RangeInclusive<i64> { -(self.history as i64)..=-1 }

    pub fn builds_url(&self, platform: &str) -> Result<Url> {
        let url = format!(
            "{}/builders/{}{}/builds",
            self.base.as_str().trim_end_matches('/'),
            self.builder_prefix,
            platform
        );
        Url::parse(&url).with_context(|| format!("Invalid builds URL {url}"))
    }

    /// Fetch the recent build slots of one platform, keeping only successful
    /// builds that carry a changeset.
    pub async fn fetch_platform(&self, platform: &str) -> Result<Vec<BuildRecord>> {
        let url = self.builds_url(platform)?;
        let query = self.slots().map(|i| ("select", i.to_string())).collect::<Vec<_>>();
        tracing::info!("Downloading builds for {}", platform);
        let response: HashMap<String, Value> = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to fetch builds for {platform}"))?
            .error_for_status()
            .with_context(|| format!("Failed to fetch builds for {platform}"))?
            .json()
            .await
            .with_context(|| format!("Failed to decode builds for {platform}"))?;
        Ok(self.parse_slots(platform, response))
    }

    fn parse_slots(
        &self,
        platform: &str,
        mut response: HashMap<String, Value>,
    ) -> Vec<BuildRecord> {
        let mut records = Vec::new();
        for slot in self.slots() {
            let Some(value) = response.remove(&slot.to_string()) else {
                tracing::warn!("{} {}: slot missing from response", platform, slot);
                continue;
            };
            if let Some(error) = value.get("error") {
                tracing::warn!("{} {}: error: {}", platform, slot, error);
                continue;
            }
            let record = match serde_json::from_value::<RawBuild>(value) {
                Ok(raw) => raw.into_record(platform),
                Err(e) => {
                    tracing::warn!("{} {}: malformed build: {}", platform, slot, e);
                    continue;
                }
            };
            match record.changeset.as_deref() {
                Some(changeset) if record.successful => {
                    tracing::debug!("{} {}: {} successful", platform, slot, changeset);
                    records.push(record);
                }
                changeset => {
                    tracing::info!(
                        "{} {}: {} not successful (yet)",
                        platform,
                        slot,
                        changeset.unwrap_or("<none>")
                    );
                }
            }
        }
        records
    }

    /// Fetch every platform in turn. A platform that fails to download is
    /// logged and left out; the others are still returned.
    pub async fn fetch_all(&self, platforms: &[String]) -> Vec<BuildRecord> {
        let mut records = Vec::new();
        for platform in platforms {
            match self.fetch_platform(platform).await {
                Ok(mut builds) => {
                    tracing::info!("Fetched {} successful builds for {}", builds.len(), platform);
                    records.append(&mut builds);
                }
                Err(e) => tracing::error!("Skipping {}: {:?}", platform, e),
            }
        }
        records
    }
}

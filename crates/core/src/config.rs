use std::{
    collections::BTreeSet,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub db: DbConfig,
    pub ci: CiConfig,
    pub platforms: PlatformsConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open config file {}", path.display()))?,
        );
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CiConfig {
    /// Base URL of the buildbot JSON API, e.g. `http://buildbot.rust-lang.org/json`.
    pub url: Url,
    /// Prepended to the platform id to form the builder name.
    #[serde(default = "default_builder_prefix")]
    pub builder_prefix: String,
    /// Number of most recent build slots requested per builder.
    #[serde(default = "default_history")]
    pub history: u32,
}

fn default_builder_prefix() -> String { "auto-".to_string() }

fn default_history() -> u32 { 10 }

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlatformsConfig {
    /// Platforms that must all report a successful build before a changeset is recorded.
    pub required: Vec<String>,
    /// Platforms that are fetched and recorded when present, but never waited on.
    #[serde(default)]
    pub optional: Vec<String>,
}

impl PlatformsConfig {
    pub fn required_set(&self) -> BTreeSet<String> { self.required.iter().cloned().collect() }

    /// Every platform to fetch, required first, without duplicates.
    pub fn all(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.required
            .iter()
            .chain(&self.optional)
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,
    /// Override for the API base, mainly for tests and GitHub Enterprise.
    #[serde(default)]
    pub url: Option<Url>,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Root of the sharded pull request metadata cache.
    #[serde(default = "default_pull_requests_dir")]
    pub pull_requests: PathBuf,
    /// Root of the downloaded build metrics tree.
    #[serde(default = "default_build_metrics_dir")]
    pub build_metrics: PathBuf,
    /// Memory profiling runs, one directory per commit hash.
    #[serde(default = "default_mem_runs_dir")]
    pub mem_runs: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pull_requests: default_pull_requests_dir(),
            build_metrics: default_build_metrics_dir(),
            mem_runs: default_mem_runs_dir(),
        }
    }
}

fn default_pull_requests_dir() -> PathBuf { PathBuf::from("pull_requests") }

fn default_build_metrics_dir() -> PathBuf { PathBuf::from("build-metrics") }

fn default_mem_runs_dir() -> PathBuf { PathBuf::from("mem/data") }

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
db:
  url: sqlite://pr.sqlite3
ci:
  url: http://buildbot.rust-lang.org/json
platforms:
  required: [linux-64-opt, linux-32-opt, mac-64-opt]
  optional: [bsd-64-opt, linux-64-opt]
github:
  owner: rust-lang
  repo: rust
"#;

    #[test]
    fn test_parse_defaults() {
        let config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.ci.builder_prefix, "auto-");
        assert_eq!(config.ci.history, 10);
        assert!(config.github.token.is_none());
        assert_eq!(config.paths.pull_requests, PathBuf::from("pull_requests"));
        assert_eq!(config.paths.mem_runs, PathBuf::from("mem/data"));
        assert_eq!(config.platforms.all(), vec![
            "linux-64-opt".to_string(),
            "linux-32-opt".to_string(),
            "mac-64-opt".to_string(),
            "bsd-64-opt".to_string(),
        ]);
        assert!(!config.platforms.required_set().contains("bsd-64-opt"));
    }
}

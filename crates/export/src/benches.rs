use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs, io,
    path::Path,
};

use anyhow::{Context, Result};
use landed_core::util::build_metrics_dir;
use landed_db::Database;
use serde::{Deserialize, Serialize};

pub const BENCH_DAYS: u32 = 100;
pub const BENCH_LIMIT: u32 = 500;

/// Library crates whose benchmark results are collected.
pub const CRATES: &[&str] = &[
    "arena", "collections", "extra", "flate", "getopts", "glob", "green", "native", "num",
    "semver", "serialize", "std", "sync", "term", "test", "time", "uuid",
];

/// Assigns each benchmark name a stable index, in first-seen order.
#[derive(Debug, Default)]
pub struct BenchIndex {
    indices: HashMap<String, usize>,
    names: Vec<String>,
}

impl BenchIndex {
    pub fn get_or_insert(&mut self, name: &str) -> usize {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let index = self.names.len();
        self.indices.insert(name.to_string(), index);
        self.names.push(name.to_string());
        index
    }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names = self.names.iter().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

#[derive(Deserialize)]
struct BenchResult {
    value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangesetEntry {
    /// Milliseconds for javascript.
    pub time: i64,
    pub changeset: String,
    pub pr: Option<u64>,
}

/// `(change id, value)` samples of one benchmark.
pub type Samples = Vec<(i64, f64)>;

/// Benchmarks of one `{module}.json` file. A bench named without `::` is the
/// module itself and is written as a bare sample list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModuleBenches {
    Bare(Samples),
    Nested(BTreeMap<String, Samples>),
}

impl ModuleBenches {
    fn new(rest: Option<&str>) -> Self {
        match rest {
            Some(_) => Self::Nested(BTreeMap::new()),
            None => Self::Bare(Samples::new()),
        }
    }

    /// Append a sample. Returns `false` if the bench does not fit the file's
    /// existing shape.
    fn push(&mut self, rest: Option<&str>, sample: (i64, f64)) -> bool {
        match (self, rest) {
            (Self::Bare(samples), None) => samples.push(sample),
            (Self::Nested(benches), Some(rest)) => {
                benches.entry(rest.to_string()).or_default().push(sample)
            }
            _ => return false,
        }
        true
    }
}

/// platform -> crate -> module -> benches.
pub type BenchTree = BTreeMap<String, BTreeMap<String, BTreeMap<String, ModuleBenches>>>;

#[derive(Debug, Default)]
pub struct BenchHistory {
    pub benches: BenchTree,
    pub changesets: BTreeMap<i64, ChangesetEntry>,
    pub platforms: BTreeSet<String>,
}

/// Crate name of a `...-<crate>-metrics.json` file.
fn metrics_crate(file_name: &str) -> Option<&str> {
    file_name.strip_suffix("-metrics.json")?.rsplit('-').next()
}

/// Gather the benchmark results of recent pull request landings from the
/// downloaded metrics tree.
pub async fn collect_benches(
    db: &Database,
    metrics_root: &Path,
    index: &mut BenchIndex,
    now: i64,
) -> Result<BenchHistory> {
    let since = now - BENCH_DAYS as i64 * 86400;
    let mut history = BenchHistory::default();
    for change in db.get_landed_pulls(since, BENCH_LIMIT).await? {
        history.changesets.insert(change.id, ChangesetEntry {
            time: change.time * 1000,
            changeset: change.changeset.clone(),
            pr: change.pull_request,
        });
        for build in db.get_builds(change.id).await? {
            history.platforms.insert(build.platform.clone());
            let dir = build_metrics_dir(metrics_root, &change.changeset, &build.platform);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries {
                let path = entry?.path();
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(krate) = metrics_crate(file_name).filter(|c| CRATES.contains(c)) else {
                    continue;
                };
                let results = match read_results(&path) {
                    Ok(results) => results,
                    Err(e) => {
                        tracing::warn!("Skipping {}: {:?}", path.display(), e);
                        continue;
                    }
                };
                for (name, result) in results {
                    let (module, rest) = match name.split_once("::") {
                        Some((module, rest)) => (module, Some(rest)),
                        None => (name.as_str(), None),
                    };
                    let pushed = history
                        .benches
                        .entry(build.platform.clone())
                        .or_default()
                        .entry(krate.to_string())
                        .or_default()
                        .entry(module.to_string())
                        .or_insert_with(|| ModuleBenches::new(rest))
                        .push(rest, (change.id, result.value));
                    if !pushed {
                        tracing::warn!(
                            "{}: {}::{} clashes with an existing module",
                            build.platform,
                            krate,
                            name
                        );
                        continue;
                    }
                    index.get_or_insert(&format!("{krate}::{name}"));
                }
            }
        }
    }
    Ok(history)
}

fn read_results(path: &Path) -> Result<BTreeMap<String, BenchResult>> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write the collected history as `{platform}/{crate}/{module}.json` files plus
/// the changeset, bench name and platform indices.
pub fn write_bench_history(
    out_dir: &Path,
    history: &BenchHistory,
    index: &BenchIndex,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create directory {}", out_dir.display()))?;
    for (platform, crates) in &history.benches {
        for (krate, modules) in crates {
            let dir = out_dir.join(platform).join(krate);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            for (module, benches) in modules {
                write_json(&dir.join(format!("{module}.json")), benches)?;
            }
        }
    }
    write_json(&out_dir.join("changesets.json"), &history.changesets)?;
    write_json(&out_dir.join("bench_names.json"), &index.sorted_names())?;
    write_json(&out_dir.join("platforms.json"), &history.platforms)?;
    Ok(())
}

//! Static dashboard artifacts rendered from the landed change history.

pub mod benches;
pub mod mem;
pub mod perf;
pub mod pulls;
pub mod simplify;

use std::{fs, path::Path};

use anyhow::{Context, Result};
use landed_core::config::Config;
use landed_db::Database;
use landed_github::PullRequestStore;

use crate::benches::{BenchIndex, collect_benches, write_bench_history};

/// Days of history in the perf plots.
pub const PERF_AGE_DAYS: u32 = 10;

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

pub async fn export_perf(db: &Database, all: bool, output: &Path, now: i64) -> Result<()> {
    let data = perf::perf_data(db, all, PERF_AGE_DAYS, now).await?;
    write_output(output, &perf::render_perf_js(&data)?)?;
    tracing::info!("Wrote {} platforms to {}", data.len(), output.display());
    Ok(())
}

pub async fn export_pulls(
    config: &Config,
    db: &Database,
    days: u32,
    output: &Path,
    now: i64,
) -> Result<()> {
    let store = PullRequestStore::new(config.paths.pull_requests.clone());
    let pulls = pulls::landed_pulls(db, &store, days, now).await?;
    let html = pulls::render_pull_list(&config.github.owner, &config.github.repo, &pulls);
    write_output(output, &html.into_string())?;
    tracing::info!("Wrote {} pull requests to {}", pulls.len(), output.display());
    Ok(())
}

pub async fn export_benches(
    config: &Config,
    db: &Database,
    out_dir: &Path,
    now: i64,
) -> Result<()> {
    let mut index = BenchIndex::default();
    let history = collect_benches(db, &config.paths.build_metrics, &mut index, now).await?;
    write_bench_history(out_dir, &history, &index)?;
    tracing::info!(
        "Wrote {} benchmarks across {} platforms to {}",
        index.len(),
        history.platforms.len(),
        out_dir.display()
    );
    Ok(())
}

pub fn export_mem(config: &Config, out_dir: &Path) -> Result<()> {
    let export = mem::export_mem_profiles(&config.paths.mem_runs, out_dir)?;
    tracing::info!(
        "Processed {} memory profiles ({} failed, {} total) into {}",
        export.processed,
        export.failed,
        export.total,
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/perf.js");
        write_output(&path, "window.PERF_DATA =\n{}\n;").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "window.PERF_DATA =\n{}\n;");
    }
}

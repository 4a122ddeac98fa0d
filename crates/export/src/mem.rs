//! Memory profile summaries of compiler runs.
//!
//! Each run directory is named after the commit hash and holds `mem.json`
//! (sampled memory use plus the compiler's pass timings on stdout),
//! `commit_info.txt` (author, commit timestamp, subject) and optionally the
//! GNU `time` output in `time.txt`. Runs are processed once; `summary.json`
//! remembers which hashes are done.

use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{simplify::visvalingam, write_output};

/// Triangles smaller than this are dropped from the memory curve.
pub const MEM_SIMPLIFY_EPSILON: f64 = 100000.0;

const BORS_AUTHOR: &str = "bors bors@rust-lang.org";
const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Deserialize)]
struct RawRun {
    #[serde(default)]
    stdout: String,
    max_memory: u64,
    #[serde(default)]
    memory_data: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemSummary {
    pub timestamp: u64,
    pub hash: String,
    pub max_memory: f64,
    pub cpu_time: Option<f64>,
    pub pull_request: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemProfile {
    pub summary: MemSummary,
    pub memory_data: Vec<(f64, f64)>,
    pub pass_timing: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct MemExport {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct CommitInfo {
    author: String,
    timestamp: u64,
    subject: String,
}

fn parse_commit_info(text: &str) -> Result<CommitInfo> {
    let mut lines = text.lines();
    let (Some(author), Some(timestamp), Some(subject)) = (lines.next(), lines.next(), lines.next())
    else {
        bail!("Expected author, timestamp and subject lines");
    };
    let timestamp =
        timestamp.trim().parse().with_context(|| format!("Invalid timestamp {timestamp:?}"))?;
    Ok(CommitInfo { author: author.to_string(), timestamp, subject: subject.to_string() })
}

/// Pull request number of a bors merge, e.g. `Auto merge of #1234 - ...`.
fn bors_pull_request(info: &CommitInfo) -> Option<u64> {
    if info.author != BORS_AUTHOR {
        return None;
    }
    let (_, after) = info.subject.split_once('#')?;
    let digits = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
    after[..digits].parse().ok()
}

/// User plus system seconds from GNU `time` output
/// (`0.52user 0.08system 0:00.61elapsed ...`).
fn parse_cpu_time(text: &str) -> Result<f64> {
    let user_end = text.find("user ").context("Missing user time")?;
    let system_end = text.find("system ").context("Missing system time")?;
    let user = text[..user_end].trim();
    let system = text.get(user_end + 5..system_end).context("Missing system time")?.trim();
    let user = user.parse::<f64>().with_context(|| format!("Invalid user time {user:?}"))?;
    let system =
        system.parse::<f64>().with_context(|| format!("Invalid system time {system:?}"))?;
    Ok(user + system)
}

/// Parse the compiler's pass timing report: indented `time: <secs> \t<pass>` lines.
///
/// When the indentation drops back out of a nested section, the enclosing
/// total is reported as a tiny negative time, scaled by the number of passes
/// in the section, so the plot can tell the total apart from its parts.
pub fn parse_pass_timing(text: &str) -> Result<Vec<(String, f64)>> {
    let mut timings = Vec::new();
    let mut last_indent = 0;
    let mut section_len = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let indent = line.len() - line.trim_start_matches(' ').len();
        let rest = line[indent..]
            .strip_prefix("time: ")
            .with_context(|| format!("Invalid pass timing line {line:?}"))?;
        let (time, _) =
            rest.split_once(' ').with_context(|| format!("Invalid pass timing line {line:?}"))?;
        let (_, pass) =
            rest.split_once('\t').with_context(|| format!("Invalid pass timing line {line:?}"))?;
        let time = time
            .trim_end_matches(';')
            .parse::<f64>()
            .with_context(|| format!("Invalid pass time in {line:?}"))?;
        let time = if indent < last_indent {
            let total = -1e-10 * section_len as f64;
            section_len = 1;
            total
        } else {
            section_len += 1;
            time
        };
        last_indent = indent;
        timings.push((pass.to_string(), time));
    }
    Ok(timings)
}

/// Build the profile of one run directory.
pub fn process_run(dir: &Path, hash: &str) -> Result<MemProfile> {
    let info_path = dir.join("commit_info.txt");
    let info = fs::read_to_string(&info_path)
        .with_context(|| format!("Failed to read {}", info_path.display()))?;
    let info =
        parse_commit_info(&info).with_context(|| format!("Invalid {}", info_path.display()))?;

    let time_path = dir.join("time.txt");
    let cpu_time = match fs::read_to_string(&time_path) {
        Ok(text) => Some(
            parse_cpu_time(&text).with_context(|| format!("Invalid {}", time_path.display()))?,
        ),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", time_path.display()));
        }
    };

    let mem_path = dir.join("mem.json");
    let data =
        fs::read(&mem_path).with_context(|| format!("Failed to read {}", mem_path.display()))?;
    let run: RawRun = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse {}", mem_path.display()))?;
    let pass_timing = parse_pass_timing(&run.stdout)
        .with_context(|| format!("Invalid pass timings in {}", mem_path.display()))?;

    Ok(MemProfile {
        summary: MemSummary {
            timestamp: info.timestamp,
            hash: hash.to_string(),
            max_memory: run.max_memory as f64,
            cpu_time,
            pull_request: bors_pull_request(&info),
        },
        memory_data: visvalingam(&run.memory_data, MEM_SIMPLIFY_EPSILON),
        pass_timing,
    })
}

fn load_summary(path: &Path) -> Result<Vec<MemSummary>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    serde_json::from_slice(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

/// One summary per line, to keep diffs of the file small.
fn render_summary(summary: &[MemSummary]) -> Result<String> {
    let lines = summary.iter().map(serde_json::to_string).collect::<Result<Vec<_>, _>>()?;
    Ok(format!("[\n{}\n]\n", lines.join(",\n")))
}

fn run_dirs(runs_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(runs_dir)
        .with_context(|| format!("Failed to read directory {}", runs_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(hash) => dirs.push((hash, entry.path())),
            Err(name) => tracing::warn!("Skipping run directory {:?}", name),
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Process every run not yet in `{out_dir}/summary.json`, writing
/// `{out_dir}/{hash}.json` for each and the merged summary, oldest first.
/// A run that fails to process is logged and retried next time.
pub fn export_mem_profiles(runs_dir: &Path, out_dir: &Path) -> Result<MemExport> {
    let summary_path = out_dir.join(SUMMARY_FILE);
    let mut summary = load_summary(&summary_path)?;
    let done = summary.iter().map(|s| s.hash.clone()).collect::<BTreeSet<_>>();
    let mut export = MemExport::default();
    for (hash, dir) in run_dirs(runs_dir)? {
        if done.contains(&hash) {
            continue;
        }
        let profile = match process_run(&dir, &hash) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Skipping run {}: {:?}", hash, e);
                export.failed += 1;
                continue;
            }
        };
        let data = serde_json::to_string(&profile)?;
        write_output(&out_dir.join(format!("{hash}.json")), &data)?;
        tracing::info!("{}: processed", hash);
        summary.push(profile.summary);
        export.processed += 1;
    }
    summary.sort_by(|a, b| (a.timestamp, &a.hash).cmp(&(b.timestamp, &b.hash)));
    export.total = summary.len();
    write_output(&summary_path, &render_summary(&summary)?)?;
    Ok(export)
}

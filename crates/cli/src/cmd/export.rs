use anyhow::Result;
use argp::FromArgs;
use landed_core::config::Config;
use landed_db::Database;
use time::OffsetDateTime;
use typed_path::Utf8NativePathBuf;

use super::{native_path, std_path};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Write compile and test time plot data.
#[argp(subcommand, name = "export-perf")]
pub struct PerfArgs {
    #[argp(switch)]
    /// include every platform, not only the main optimized builders
    all: bool,
    #[argp(option, short = 'o', from_str_fn(native_path))]
    /// output file (default: perf.js, or all.js with --all)
    output: Option<Utf8NativePathBuf>,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Write the list of recently landed pull requests.
#[argp(subcommand, name = "export-prs")]
pub struct PullsArgs {
    #[argp(option, default = "8")]
    /// days of history (default: 8)
    days: u32,
    #[argp(
        option,
        short = 'o',
        from_str_fn(native_path),
        default = "Utf8NativePathBuf::from(\"index.html\")"
    )]
    /// output file (default: index.html)
    output: Utf8NativePathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Write the benchmark history collected from downloaded build metrics.
#[argp(subcommand, name = "export-benches")]
pub struct BenchesArgs {
    #[argp(
        option,
        short = 'o',
        from_str_fn(native_path),
        default = "Utf8NativePathBuf::from(\"bench\")"
    )]
    /// output directory (default: bench)
    output: Utf8NativePathBuf,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Summarize memory profiling runs and simplify their memory curves.
#[argp(subcommand, name = "export-mem")]
pub struct MemArgs {
    #[argp(
        option,
        short = 'o',
        from_str_fn(native_path),
        default = "Utf8NativePathBuf::from(\"mem/out\")"
    )]
    /// output directory (default: mem/out)
    output: Utf8NativePathBuf,
}

fn now() -> i64 { OffsetDateTime::now_utc().unix_timestamp() }

pub async fn run_perf(args: PerfArgs, db: &Database) -> Result<()> {
    let output = args.output.unwrap_or_else(|| {
        Utf8NativePathBuf::from(if args.all { "all.js" } else { "perf.js" })
    });
    landed_export::export_perf(db, args.all, std_path(&output), now()).await
}

pub async fn run_pulls(args: PullsArgs, config: &Config, db: &Database) -> Result<()> {
    landed_export::export_pulls(config, db, args.days, std_path(&args.output), now()).await
}

pub async fn run_benches(args: BenchesArgs, config: &Config, db: &Database) -> Result<()> {
    landed_export::export_benches(config, db, std_path(&args.output), now()).await
}

pub fn run_mem(args: MemArgs, config: &Config) -> Result<()> {
    landed_export::export_mem(config, std_path(&args.output))
}

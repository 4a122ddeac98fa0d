mod cmd;

use anyhow::{Context, Result};
use argp::FromArgs;
use landed_core::config::Config;
use landed_db::Database;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use typed_path::Utf8NativePathBuf;

use crate::cmd::{native_path, std_path};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Track changes landed through CI, and render their history.
struct TopLevel {
    #[argp(
        option,
        short = 'c',
        from_str_fn(native_path),
        default = "Utf8NativePathBuf::from(\"config.yml\")"
    )]
    /// configuration file (default: config.yml)
    config: Utf8NativePathBuf,
    #[argp(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Ingest(cmd::ingest::Args),
    ExportPerf(cmd::export::PerfArgs),
    ExportPrs(cmd::export::PullsArgs),
    ExportBenches(cmd::export::BenchesArgs),
    ExportMem(cmd::export::MemArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    if let Err(e) = run(args).await {
        tracing::error!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: TopLevel) -> Result<()> {
    let config = Config::load(std_path(&args.config))?;
    let db = Database::new(&config.db).await.context("Failed to open database")?;
    let result = match args.command {
        SubCommand::Ingest(c_args) => cmd::ingest::run(c_args, &config, &db).await,
        SubCommand::ExportPerf(c_args) => cmd::export::run_perf(c_args, &db).await,
        SubCommand::ExportPrs(c_args) => cmd::export::run_pulls(c_args, &config, &db).await,
        SubCommand::ExportBenches(c_args) => cmd::export::run_benches(c_args, &config, &db).await,
        SubCommand::ExportMem(c_args) => cmd::export::run_mem(c_args, &config),
    };
    db.close().await;
    result
}

use anyhow::Result;
use argp::FromArgs;
use landed_core::config::Config;
use landed_db::Database;

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Fetch recent builds and store the changes that landed on every required platform.
#[argp(subcommand, name = "ingest")]
pub struct Args {}

pub async fn run(_args: Args, config: &Config, db: &Database) -> Result<()> {
    landed_ingest::run(config, db).await?;
    Ok(())
}

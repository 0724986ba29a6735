use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use dumpgate::{DumpgateConfig, ReadAheadCache};

use super::args::{Cli, Command};

mod parse;
mod resolve;
mod stat;
mod warm;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config_path = cli.config.as_deref();
    match cli.cmd {
        Command::Parse(args) => parse::run(args),
        Command::Resolve(args) => resolve::run(args, load_config(config_path)?),
        Command::Stat(args) => stat::run(args, load_config(config_path)?).await,
        Command::Warm(args) => warm::run(args, load_config(config_path)?).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DumpgateConfig> {
    DumpgateConfig::load(path).context("loading configuration")
}

/// Wait until all queued read-ahead has finished.
async fn drain(cache: &ReadAheadCache) {
    while cache.in_flight() > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

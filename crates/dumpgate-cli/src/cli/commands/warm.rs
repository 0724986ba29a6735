use dumpgate::{DumpgateConfig, ReadAheadCache};
use serde_json::json;

use super::{drain, print_json};
use crate::cli::args::WarmArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: WarmArgs, config: DumpgateConfig) -> anyhow::Result<i32> {
    let cache = ReadAheadCache::new(config.read_ahead)?;
    let issued = cache.issue_for_path(&args.path);

    if !args.no_wait {
        drain(&cache).await;
    }

    print_json(&json!({
        "path": args.path,
        "issued": issued,
        "pending": cache.in_flight(),
    }))?;
    Ok(SUCCESS)
}

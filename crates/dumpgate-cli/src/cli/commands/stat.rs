use std::sync::Arc;

use anyhow::Context;
use dumpgate::{
    AccessPipeline, DumpgateConfig, FileService, HttpEventSource, HttpPolicyEngine,
    HttpStepUpEnforcer, Principal, ReadAheadCache, ReadOnlyFileService, RequestContext,
};
use tracing::info;

use super::{drain, print_json};
use crate::cli::args::StatArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(args: StatArgs, config: DumpgateConfig) -> anyhow::Result<i32> {
    let backends = &config.backends;
    let timeout = backends.timeout();

    let access = AccessPipeline::new(
        Arc::new(HttpEventSource::new(backends.event_api_url()?, timeout)?),
        Arc::new(HttpPolicyEngine::new(backends.policy_url()?, timeout)?),
        Arc::new(HttpStepUpEnforcer::new(backends.step_up_url()?, timeout)?),
        backends.policy_prefix.clone(),
    );
    let read_ahead = Arc::new(ReadAheadCache::new(config.read_ahead.clone())?);
    let files = ReadOnlyFileService::from_config(&config, access, Arc::clone(&read_ahead))?;

    let principal = Principal {
        identity: args.user,
        is_privileged: args.privileged,
    };
    let mut ctx = RequestContext::new(principal);
    ctx.step_up_token = args.step_up_token;

    let view = files
        .file_view_by_unique_name(&args.name, &ctx)
        .await
        .with_context(|| format!("stat {}", args.name))?;
    print_json(&view)?;

    if !args.no_wait {
        drain(&read_ahead).await;
        info!(tracked = read_ahead.tracked(), "read-ahead drained");
    }
    Ok(SUCCESS)
}

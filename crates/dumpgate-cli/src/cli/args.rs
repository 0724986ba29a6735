use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dumpgate",
    version,
    about = "Read-only heap dump access: resolve, authorize and warm index files"
)]
pub struct Cli {
    /// YAML configuration file (environment variables override it)
    #[arg(long, global = true, env = "DUMPGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a composite identifier
    Parse(ParseArgs),
    /// Print the physical path of an artifact
    Resolve(ResolveArgs),
    /// Authorize and stat a heap dump, warming its index files
    Stat(StatArgs),
    /// Warm the index files next to a heap dump
    Warm(WarmArgs),
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct ResolveArgs {
    pub name: String,

    /// Artifact kind: heap-dump, gc-log, thread-dump, jfr-file
    #[arg(long, default_value = "heap-dump")]
    pub kind: String,
}

#[derive(Parser, Debug)]
pub struct StatArgs {
    pub name: String,

    /// Identity of the requesting principal
    #[arg(long)]
    pub user: String,

    /// Principal may escalate through step-up when the policy denies
    #[arg(long)]
    pub privileged: bool,

    /// Previously obtained step-up token
    #[arg(long, env = "DUMPGATE_STEP_UP_TOKEN")]
    pub step_up_token: Option<String>,

    /// Return without waiting for read-ahead to finish
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Parser, Debug)]
pub struct WarmArgs {
    /// Path of the heap dump whose index files should be read
    pub path: PathBuf,

    /// Return without waiting for read-ahead to finish
    #[arg(long)]
    pub no_wait: bool,
}

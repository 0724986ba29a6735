use dumpgate::{DumpgateConfig, FileKind, PathResolver};
use serde_json::json;

use super::print_json;
use crate::cli::args::ResolveArgs;
use crate::exit_codes::SUCCESS;

pub fn run(args: ResolveArgs, config: DumpgateConfig) -> anyhow::Result<i32> {
    let kind: FileKind = args.kind.parse()?;
    let base = config.storage_path()?;

    let mut resolver = PathResolver::new();
    if let Some(root) = &config.composite_root {
        resolver = resolver.with_composite_root(root);
    }

    let (path, scheme) = resolver.resolve(&base, kind, &args.name);
    print_json(&json!({
        "name": args.name,
        "kind": kind,
        "scheme": scheme,
        "path": path,
        "exists": path.is_file(),
    }))?;
    Ok(SUCCESS)
}

use dumpgate::ResourceIdentifier;

use super::print_json;
use crate::cli::args::ParseArgs;
use crate::exit_codes::SUCCESS;

pub fn run(args: ParseArgs) -> anyhow::Result<i32> {
    let id = ResourceIdentifier::parse_required(&args.name)?;
    print_json(&id)?;
    Ok(SUCCESS)
}

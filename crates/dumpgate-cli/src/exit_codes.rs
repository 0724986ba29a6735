//! Process exit codes.
//!
//! Access errors keep the codes from `AccessError::exit_code`. Command-line
//! mistakes and every other failure get codes no access error uses.

use dumpgate::AccessError;

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 10;
pub const USAGE_ERROR: i32 = 64;

pub fn for_error(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<AccessError>())
        .map(AccessError::exit_code)
        .unwrap_or(INTERNAL_ERROR)
}
